//! Non-terminal cascade levels.

use std::sync::Arc;

use crate::alias::{AliasKind, AliasTable};
use crate::correction::{CorrectionStore, MatchKind};
use crate::directory::DirectoryMatcher;
use crate::error::CascadeResult;
use crate::result::{Candidate, LevelKind, Source};

/// The query in both forms a level may need.
#[derive(Debug, Clone, Copy)]
pub struct Query<'a> {
    /// As the caller gave it.
    pub raw: &'a str,
    /// `normalize(raw)`.
    pub normalized: &'a str,
}

/// One strategy in the cascade.
///
/// A level proposes at most one candidate; the dispatcher decides whether it
/// clears [`ResolutionLevel::threshold`]. Errors are logged by the dispatcher
/// and treated as "no result".
pub trait ResolutionLevel: Send + Sync {
    /// Which level this is.
    fn kind(&self) -> LevelKind;

    /// Minimum confidence for a candidate to be accepted.
    fn threshold(&self) -> f32;

    /// Proposes a candidate for `query`.
    ///
    /// # Errors
    /// Level-specific; never fatal to the cascade.
    fn attempt(&self, query: Query<'_>) -> CascadeResult<Option<Candidate>>;
}

/// Confirmed user corrections, keyed by normalized query.
pub struct CorrectionLevel {
    store: Arc<CorrectionStore>,
    threshold: f32,
}

impl CorrectionLevel {
    /// Creates the level over a shared store.
    #[must_use]
    pub fn new(store: Arc<CorrectionStore>, threshold: f32) -> Self {
        Self { store, threshold }
    }
}

impl ResolutionLevel for CorrectionLevel {
    fn kind(&self) -> LevelKind {
        LevelKind::UserCorrection
    }

    fn threshold(&self) -> f32 {
        self.threshold
    }

    fn attempt(&self, query: Query<'_>) -> CascadeResult<Option<Candidate>> {
        let found = self.store.lookup_normalized(query.normalized)?;
        Ok(found.map(|m| {
            tracing::debug!(
                key = %m.entry.normalized_key,
                containment = m.kind == MatchKind::Containment,
                "correction matched"
            );
            Candidate::new(m.entry.canonical_name, m.confidence, Source::UserCorrection)
        }))
    }
}

/// A static alias table looked up with the literal query.
pub struct AliasLevel {
    table: AliasTable,
    threshold: f32,
}

impl AliasLevel {
    /// Creates the level over an owned table.
    #[must_use]
    pub fn new(table: AliasTable, threshold: f32) -> Self {
        Self { table, threshold }
    }
}

impl ResolutionLevel for AliasLevel {
    fn kind(&self) -> LevelKind {
        match self.table.kind() {
            AliasKind::Listed => LevelKind::ListedAlias,
            AliasKind::Brand => LevelKind::BrandAlias,
        }
    }

    fn threshold(&self) -> f32 {
        self.threshold
    }

    fn attempt(&self, query: Query<'_>) -> CascadeResult<Option<Candidate>> {
        let source = match self.table.kind() {
            AliasKind::Listed => Source::ListedAlias,
            AliasKind::Brand => Source::BrandAlias,
        };
        Ok(self
            .table
            .get(query.raw)
            .map(|e| Candidate::new(e.canonical_name.clone(), e.confidence, source)))
    }
}

/// The directory matcher, queried with the literal query.
pub struct DirectoryLevel {
    matcher: Arc<DirectoryMatcher>,
    threshold: f32,
}

impl DirectoryLevel {
    /// Creates the level over a shared matcher.
    #[must_use]
    pub fn new(matcher: Arc<DirectoryMatcher>, threshold: f32) -> Self {
        Self { matcher, threshold }
    }
}

impl ResolutionLevel for DirectoryLevel {
    fn kind(&self) -> LevelKind {
        LevelKind::Directory
    }

    fn threshold(&self) -> f32 {
        self.threshold
    }

    fn attempt(&self, query: Query<'_>) -> CascadeResult<Option<Candidate>> {
        let hit = self.matcher.match_query(query.raw)?;
        Ok(hit.map(|m| Candidate {
            predicted_name: m.record.canonical_name.clone(),
            confidence: m.confidence,
            source: m.source,
            record: Some(m.record),
        }))
    }
}

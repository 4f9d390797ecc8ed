//! Tiered matching of a query against the directory.
//!
//! Tiers run in order and the first non-empty tier answers:
//!
//! | tier      | store query                        | pick                    |
//! |-----------|------------------------------------|-------------------------|
//! | exact     | `find_exact(query)`                | the row                 |
//! | pattern   | `find_exact_any(affixed variants)` | first variant present   |
//! | prefix    | `find_prefix(query)`               | shortest, then by bytes |
//! | substring | `find_substring(query)`            | shortest, then by bytes |
//!
//! Each tier is one store round trip. The whole match shares a single deadline.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::pool::QueryPool;
use super::traits::{DirectoryRecord, DirectoryStore, StorageError};
use crate::confidence::Confidence;
use crate::error::ValidationError;
use crate::result::Source;

/// Where an affix goes relative to the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AffixPosition {
    /// `{form}{query}`
    Prepend,
    /// `{query}{form}`
    Append,
}

/// One legal-form variant tried by the pattern tier.
///
/// `form` is inserted verbatim, so Latin forms carry their own spacing
/// (e.g. `" Inc."`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffixPattern {
    /// Legal-form token.
    pub form: String,
    /// Prepend or append.
    pub position: AffixPosition,
    /// Confidence when this variant is the one found.
    pub confidence: f32,
}

impl AffixPattern {
    /// Creates a pattern.
    #[must_use]
    pub fn new(form: impl Into<String>, position: AffixPosition, confidence: f32) -> Self {
        Self {
            form: form.into(),
            position,
            confidence,
        }
    }

    /// The variant of `query` this pattern produces.
    #[must_use]
    pub fn apply(&self, query: &str) -> String {
        match self.position {
            AffixPosition::Prepend => format!("{}{query}", self.form),
            AffixPosition::Append => format!("{query}{}", self.form),
        }
    }

    /// Japanese corporate forms, most common first, prefix before suffix.
    #[must_use]
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("株式会社", AffixPosition::Prepend, 0.95),
            Self::new("株式会社", AffixPosition::Append, 0.94),
            Self::new("有限会社", AffixPosition::Prepend, 0.93),
            Self::new("有限会社", AffixPosition::Append, 0.92),
            Self::new("合同会社", AffixPosition::Prepend, 0.93),
            Self::new("合同会社", AffixPosition::Append, 0.92),
        ]
    }
}

/// Matcher settings.
#[derive(Debug, Clone, PartialEq)]
pub struct MatcherConfig {
    /// Budget for the whole match, all tiers included.
    pub timeout: Duration,
    /// Query worker threads.
    pub workers: usize,
    /// Queries allowed to wait for a worker.
    pub queue_capacity: usize,
    /// Candidates fetched by the prefix and substring tiers.
    pub candidate_limit: usize,
    /// Exact tier confidence.
    pub exact_confidence: f32,
    /// Prefix tier confidence.
    pub prefix_confidence: f32,
    /// Substring tier confidence.
    pub substring_confidence: f32,
    /// Pattern tier variants, in priority order.
    pub affixes: Vec<AffixPattern>,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(250),
            workers: 2,
            queue_capacity: 64,
            candidate_limit: 3,
            exact_confidence: 0.98,
            prefix_confidence: 0.90,
            substring_confidence: 0.80,
            affixes: AffixPattern::defaults(),
        }
    }
}

impl MatcherConfig {
    /// Checks ranges and non-zero sizes.
    ///
    /// # Errors
    /// Returns the first invalid field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.timeout.is_zero() {
            return Err(ValidationError::ZeroValue {
                field: "directory.timeout_ms".into(),
            });
        }
        for (field, value) in [
            ("directory.workers", self.workers),
            ("directory.queue_capacity", self.queue_capacity),
            ("directory.candidate_limit", self.candidate_limit),
        ] {
            if value == 0 {
                return Err(ValidationError::ZeroValue {
                    field: field.into(),
                });
            }
        }
        Confidence::validate_value(self.exact_confidence)?;
        Confidence::validate_value(self.prefix_confidence)?;
        Confidence::validate_value(self.substring_confidence)?;
        for affix in &self.affixes {
            if affix.form.is_empty() {
                return Err(ValidationError::MissingField {
                    field: "directory.affixes.form".into(),
                });
            }
            Confidence::validate_value(affix.confidence)?;
        }
        Ok(())
    }
}

/// A directory hit.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryMatch {
    /// The matched row.
    pub record: DirectoryRecord,
    /// Tier confidence.
    pub confidence: Confidence,
    /// Which tier answered.
    pub source: Source,
}

/// Runs the tiers against a store, bounded by a timeout.
pub struct DirectoryMatcher {
    store: Arc<dyn DirectoryStore>,
    pool: QueryPool,
    config: MatcherConfig,
}

impl std::fmt::Debug for DirectoryMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryMatcher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl DirectoryMatcher {
    /// Creates a matcher and starts its query workers.
    ///
    /// # Errors
    /// `BackendError` if the config is invalid or a worker cannot be spawned.
    pub fn new(store: Arc<dyn DirectoryStore>, config: MatcherConfig) -> Result<Self, StorageError> {
        config
            .validate()
            .map_err(|e| StorageError::BackendError(e.to_string()))?;
        let pool = QueryPool::start(config.workers, config.queue_capacity)?;
        Ok(Self {
            store,
            pool,
            config,
        })
    }

    /// Matcher settings.
    #[must_use]
    pub const fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Total records in the store, bounded by the same timeout as a match.
    ///
    /// # Errors
    /// Store failure or timeout.
    pub fn record_count(&self) -> Result<u64, StorageError> {
        let deadline = Instant::now() + self.config.timeout;
        self.query(deadline, |store| store.record_count())
    }

    /// Finds the best directory row for `query`.
    ///
    /// Returns `Ok(None)` when no tier matches or the query is empty.
    ///
    /// # Errors
    /// Store failure, full queue, or the deadline passing mid-match. Tiers
    /// that already came back empty are not retried.
    pub fn match_query(&self, query: &str) -> Result<Option<DirectoryMatch>, StorageError> {
        if query.is_empty() {
            return Ok(None);
        }
        let deadline = Instant::now() + self.config.timeout;

        let q = query.to_string();
        if let Some(record) = self.query(deadline, move |s| s.find_exact(&q))? {
            return Ok(Some(self.hit(record, self.config.exact_confidence, Source::DirectoryExact)));
        }

        if !self.config.affixes.is_empty() {
            let variants: Vec<String> = self.config.affixes.iter().map(|a| a.apply(query)).collect();
            let wanted = variants.clone();
            let found = self.query(deadline, move |s| s.find_exact_any(&wanted))?;
            let best = self
                .config
                .affixes
                .iter()
                .zip(&variants)
                .find_map(|(affix, variant)| {
                    found
                        .iter()
                        .find(|r| r.canonical_name == *variant)
                        .map(|r| (affix.confidence, r))
                });
            if let Some((confidence, record)) = best {
                return Ok(Some(self.hit(record.clone(), confidence, Source::DirectoryPattern)));
            }
        }

        let limit = self.config.candidate_limit;
        let q = query.to_string();
        let found = self.query(deadline, move |s| s.find_prefix(&q, limit))?;
        if let Some(record) = shortest(found, |name| name.starts_with(query)) {
            return Ok(Some(self.hit(record, self.config.prefix_confidence, Source::DirectoryPrefix)));
        }

        let q = query.to_string();
        let found = self.query(deadline, move |s| s.find_substring(&q, limit))?;
        if let Some(record) = shortest(found, |name| name.contains(query)) {
            return Ok(Some(self.hit(
                record,
                self.config.substring_confidence,
                Source::DirectorySubstring,
            )));
        }

        debug!(query, "no directory tier matched");
        Ok(None)
    }

    fn hit(&self, record: DirectoryRecord, confidence: f32, source: Source) -> DirectoryMatch {
        debug!(
            name = %record.canonical_name,
            tier = source.as_str(),
            confidence,
            "directory hit"
        );
        DirectoryMatch {
            record,
            confidence: Confidence::calibrated(confidence),
            source,
        }
    }

    fn query<T, F>(&self, deadline: Instant, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn DirectoryStore) -> Result<T, StorageError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let remaining = deadline.saturating_duration_since(Instant::now());
        self.pool.run(
            remaining,
            move || f(store.as_ref()),
            |worker| self.store.interrupt(worker),
        )?
    }
}

/// Shortest accepted name, ties broken by byte order. Candidates the store
/// returned but that do not satisfy `accept` are ignored.
fn shortest(
    candidates: Vec<DirectoryRecord>,
    accept: impl Fn(&str) -> bool,
) -> Option<DirectoryRecord> {
    candidates
        .into_iter()
        .filter(|r| accept(&r.canonical_name))
        .min_by(|a, b| a.specificity_key().cmp(&b.specificity_key()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::InMemoryDirectory;

    fn matcher(records: &[&str]) -> DirectoryMatcher {
        let store: InMemoryDirectory = records
            .iter()
            .enumerate()
            .map(|(i, n)| DirectoryRecord::new(*n, format!("{:013}", i + 1), "東京都"))
            .collect();
        DirectoryMatcher::new(Arc::new(store), MatcherConfig::default()).unwrap()
    }

    #[test]
    fn test_exact_tier() {
        let m = matcher(&["Acme Trading", "Acme Trading Holdings"]);
        let hit = m.match_query("Acme Trading").unwrap().unwrap();
        assert_eq!(hit.source, Source::DirectoryExact);
        assert_eq!(hit.record.canonical_name, "Acme Trading");
        assert!((hit.confidence.value() - 0.98).abs() < f32::EPSILON);
    }

    #[test]
    fn test_pattern_tier_prefers_prepended_form() {
        let m = matcher(&["株式会社アクメ", "アクメ株式会社", "アクメ商事株式会社"]);
        let hit = m.match_query("アクメ").unwrap().unwrap();
        assert_eq!(hit.source, Source::DirectoryPattern);
        assert_eq!(hit.record.canonical_name, "株式会社アクメ");
        assert!((hit.confidence.value() - 0.95).abs() < f32::EPSILON);
    }

    #[test]
    fn test_pattern_tier_suffix_and_other_forms() {
        let m = matcher(&["アクメ株式会社"]);
        let hit = m.match_query("アクメ").unwrap().unwrap();
        assert_eq!(hit.record.canonical_name, "アクメ株式会社");
        assert!((hit.confidence.value() - 0.94).abs() < f32::EPSILON);

        let m = matcher(&["有限会社タナカ", "タナカ合同会社"]);
        let hit = m.match_query("タナカ").unwrap().unwrap();
        assert_eq!(hit.record.canonical_name, "有限会社タナカ");
        assert!((hit.confidence.value() - 0.93).abs() < f32::EPSILON);
    }

    #[test]
    fn test_prefix_tier_shortest_then_lexicographic() {
        let m = matcher(&["Acme Zeta", "Acme Beta", "Acme Trading Holdings"]);
        let hit = m.match_query("Acme").unwrap().unwrap();
        assert_eq!(hit.source, Source::DirectoryPrefix);
        assert_eq!(hit.record.canonical_name, "Acme Beta");
    }

    #[test]
    fn test_substring_tier() {
        let m = matcher(&["Global Widgets Ltd", "Big Widgets", "Widgetry"]);
        let hit = m.match_query("Widgets").unwrap().unwrap();
        assert_eq!(hit.source, Source::DirectorySubstring);
        assert_eq!(hit.record.canonical_name, "Big Widgets");
        assert!((hit.confidence.value() - 0.80).abs() < f32::EPSILON);
    }

    #[test]
    fn test_no_match_and_empty_query() {
        let m = matcher(&["Acme Trading"]);
        assert!(m.match_query("Zebra").unwrap().is_none());
        assert!(m.match_query("").unwrap().is_none());
    }

    #[test]
    fn test_record_count() {
        let m = matcher(&["A", "B", "C"]);
        assert_eq!(m.record_count().unwrap(), 3);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = MatcherConfig {
            candidate_limit: 0,
            ..MatcherConfig::default()
        };
        let err = DirectoryMatcher::new(Arc::new(InMemoryDirectory::new()), config).unwrap_err();
        assert!(err.to_string().contains("candidate_limit"));

        let config = MatcherConfig {
            affixes: vec![AffixPattern::new("Inc", AffixPosition::Append, 1.5)],
            ..MatcherConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_affix_apply() {
        let p = AffixPattern::new(" Inc.", AffixPosition::Append, 0.9);
        assert_eq!(p.apply("Acme"), "Acme Inc.");
        let p = AffixPattern::new("株式会社", AffixPosition::Prepend, 0.95);
        assert_eq!(p.apply("アクメ"), "株式会社アクメ");
    }
}

//! The cascade dispatcher.
//!
//! ```text
//! query ─► normalize ─► UserCorrection ─► ListedAlias ─► BrandAlias ─► Directory ─► Fallback
//!                         │ accepted?        │              │             │            │
//!                         └──────────────────┴──────────────┴─────────────┴────────────┴─► result
//! ```
//!
//! Levels are tried in order; the first candidate whose confidence clears its
//! level's threshold wins and later levels are not consulted. A level that
//! fails is logged and skipped. The fallback always answers, so `resolve`
//! returns a result for every input.

mod level;
mod stats;

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::alias::{AliasKind, AliasTable};
use crate::config::{CascadeConfig, ThresholdConfig};
use crate::correction::{CorrectionEntry, CorrectionStore};
use crate::directory::{DirectoryMatcher, DirectoryStore, MatcherConfig};
use crate::error::{CascadeError, CascadeResult, ConfigError};
use crate::fallback::{FallbackConfig, FallbackSynthesizer};
use crate::normalize::normalize;
use crate::result::{Candidate, LevelKind, ResolutionResult};

pub use level::{AliasLevel, CorrectionLevel, DirectoryLevel, Query, ResolutionLevel};
pub use stats::Statistics;

use stats::Telemetry;

/// Who is asking. Recorded on the tracing span only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerContext {
    /// End user, if known.
    pub user_id: Option<String>,
    /// Request correlation id, if any.
    pub request_id: Option<String>,
}

/// Cascade engine. `Send + Sync`; share it behind an `Arc`.
pub struct CascadeEngine {
    corrections: Arc<CorrectionStore>,
    levels: Vec<Box<dyn ResolutionLevel>>,
    directory: Option<Arc<DirectoryMatcher>>,
    fallback: FallbackSynthesizer,
    telemetry: Telemetry,
}

impl std::fmt::Debug for CascadeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CascadeEngine")
            .field(
                "levels",
                &self.levels.iter().map(|l| l.kind()).collect::<Vec<_>>(),
            )
            .field("corrections", &self.corrections.len())
            .finish_non_exhaustive()
    }
}

impl CascadeEngine {
    /// Starts a builder with in-memory corrections, the built-in alias
    /// tables, no directory and default thresholds.
    #[must_use]
    pub fn builder() -> CascadeEngineBuilder {
        CascadeEngineBuilder::default()
    }

    /// Builds an engine from a validated configuration.
    ///
    /// # Errors
    /// Configuration, correction log or directory errors.
    pub fn from_config(config: &CascadeConfig) -> CascadeResult<Self> {
        config.validate().map_err(ConfigError::from)?;

        let corrections = match &config.corrections.log_path {
            Some(path) => CorrectionStore::open(path, config.corrections.sync_on_write)?,
            None => CorrectionStore::in_memory(),
        };

        let listed = match &config.aliases.listed_path {
            Some(path) => AliasTable::from_file(AliasKind::Listed, path)?,
            None => AliasTable::builtin(AliasKind::Listed)?,
        };
        let brand = match &config.aliases.brand_path {
            Some(path) => AliasTable::from_file(AliasKind::Brand, path)?,
            None => AliasTable::builtin(AliasKind::Brand)?,
        };

        let mut builder = Self::builder()
            .corrections(Arc::new(corrections))
            .listed_aliases(listed)
            .brand_aliases(brand)
            .thresholds(config.thresholds)
            .fallback(config.fallback.clone())
            .matcher_config(config.directory.matcher_config());

        if let Some(path) = &config.directory.sqlite_path {
            builder = builder.directory(open_sqlite(path, config.directory.create_index)?);
        }

        builder.build()
    }

    /// Resolves a query. Never fails.
    #[must_use]
    pub fn resolve(&self, query: &str) -> ResolutionResult {
        self.resolve_with_context(query, &CallerContext::default())
    }

    /// Resolves a query on behalf of a caller.
    #[must_use]
    pub fn resolve_with_context(&self, query: &str, ctx: &CallerContext) -> ResolutionResult {
        let span = tracing::debug_span!(
            "resolve",
            user_id = ctx.user_id.as_deref(),
            request_id = ctx.request_id.as_deref(),
        );
        let _guard = span.enter();

        let started = Instant::now();
        let normalized = normalize(query);
        let q = Query {
            raw: query,
            normalized: &normalized,
        };

        let candidate = self
            .run_levels(q)
            .unwrap_or_else(|| self.fallback.synthesize(query));

        let latency_micros = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
        self.telemetry
            .record_accepted(candidate.source, latency_micros);
        debug!(
            source = candidate.source.as_str(),
            confidence = candidate.confidence.value(),
            latency_micros,
            "resolved"
        );

        ResolutionResult {
            query: query.to_string(),
            predicted_name: candidate.predicted_name,
            confidence: candidate.confidence,
            source: candidate.source,
            latency_micros,
            record: candidate.record,
        }
    }

    /// Resolves each query in order.
    pub fn resolve_batch<I, S>(&self, queries: I) -> Vec<ResolutionResult>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        queries
            .into_iter()
            .map(|q| self.resolve(q.as_ref()))
            .collect()
    }

    fn run_levels(&self, q: Query<'_>) -> Option<Candidate> {
        for level in &self.levels {
            let kind = level.kind();
            match level.attempt(q) {
                Ok(Some(candidate)) if candidate.confidence.meets(level.threshold()) => {
                    return Some(candidate);
                }
                Ok(Some(candidate)) => {
                    debug!(
                        level = kind.as_str(),
                        confidence = candidate.confidence.value(),
                        threshold = level.threshold(),
                        "candidate below threshold"
                    );
                    self.telemetry.record_rejected(kind);
                }
                Ok(None) => {}
                Err(err) => {
                    if kind == LevelKind::Directory {
                        self.telemetry.record_directory_failure();
                    }
                    warn!(level = kind.as_str(), error = %err, "level failed; skipping");
                }
            }
        }
        None
    }

    /// Records a confirmed correction; later lookups of the same normalized
    /// query answer with it.
    ///
    /// # Errors
    /// Blank query or canonical name, or a correction log failure. On error
    /// the in-memory map is unchanged.
    pub fn record_correction(
        &self,
        original_query: &str,
        predicted_name: &str,
        canonical_name: &str,
    ) -> CascadeResult<CorrectionEntry> {
        self.corrections
            .record(original_query, predicted_name, canonical_name)
    }

    /// Rewrites the correction log down to one line per key.
    ///
    /// # Errors
    /// Correction log failure; the previous log stays valid.
    pub fn compact_corrections(&self) -> CascadeResult<usize> {
        Ok(self.corrections.compact()?)
    }

    /// The correction store.
    #[must_use]
    pub fn corrections(&self) -> &Arc<CorrectionStore> {
        &self.corrections
    }

    /// Counter snapshot.
    #[must_use]
    pub fn statistics(&self) -> Statistics {
        let directory_records = self
            .directory
            .as_ref()
            .and_then(|m| m.record_count().ok());
        self.telemetry
            .snapshot(self.corrections.len(), directory_records)
    }
}

#[cfg(feature = "sqlite")]
fn open_sqlite(path: &std::path::Path, create_index: bool) -> CascadeResult<Arc<dyn DirectoryStore>> {
    use crate::directory::SqliteDirectory;

    let store = if create_index {
        SqliteDirectory::open_existing(path)?
    } else {
        SqliteDirectory::open_read_only(path)?
    };
    store.verify_schema()?;
    if create_index {
        store.ensure_indexes()?;
    }
    info!(path = %path.display(), create_index, "opened sqlite directory");
    Ok(Arc::new(store))
}

#[cfg(not(feature = "sqlite"))]
fn open_sqlite(path: &std::path::Path, _create_index: bool) -> CascadeResult<Arc<dyn DirectoryStore>> {
    Err(ConfigError::Parse {
        origin: path.display().to_string(),
        message: "directory.sqlite_path is set but the sqlite feature is disabled".into(),
    }
    .into())
}

/// Builder for [`CascadeEngine`].
#[derive(Default)]
pub struct CascadeEngineBuilder {
    corrections: Option<Arc<CorrectionStore>>,
    listed: Option<AliasTable>,
    brand: Option<AliasTable>,
    directory: Option<Arc<dyn DirectoryStore>>,
    matcher_config: MatcherConfig,
    thresholds: ThresholdConfig,
    fallback: FallbackConfig,
}

impl CascadeEngineBuilder {
    /// Correction store to share.
    #[must_use]
    pub fn corrections(mut self, store: Arc<CorrectionStore>) -> Self {
        self.corrections = Some(store);
        self
    }

    /// Listed-entity table; replaces the built-in one.
    #[must_use]
    pub fn listed_aliases(mut self, table: AliasTable) -> Self {
        self.listed = Some(table);
        self
    }

    /// Brand table; replaces the built-in one.
    #[must_use]
    pub fn brand_aliases(mut self, table: AliasTable) -> Self {
        self.brand = Some(table);
        self
    }

    /// Directory store. Without one the directory level is skipped.
    #[must_use]
    pub fn directory(mut self, store: Arc<dyn DirectoryStore>) -> Self {
        self.directory = Some(store);
        self
    }

    /// Directory matcher settings.
    #[must_use]
    pub fn matcher_config(mut self, config: MatcherConfig) -> Self {
        self.matcher_config = config;
        self
    }

    /// Acceptance thresholds.
    #[must_use]
    pub fn thresholds(mut self, thresholds: ThresholdConfig) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Fallback settings.
    #[must_use]
    pub fn fallback(mut self, config: FallbackConfig) -> Self {
        self.fallback = config;
        self
    }

    /// Builds the engine.
    ///
    /// # Errors
    /// Invalid thresholds or fallback settings, an alias table kind mismatch,
    /// or a directory matcher that fails to start.
    pub fn build(self) -> CascadeResult<CascadeEngine> {
        self.thresholds.validate()?;
        let fallback = FallbackSynthesizer::new(self.fallback)?;

        let listed = match self.listed {
            Some(t) => t,
            None => AliasTable::builtin(AliasKind::Listed)?,
        };
        let brand = match self.brand {
            Some(t) => t,
            None => AliasTable::builtin(AliasKind::Brand)?,
        };
        if listed.kind() != AliasKind::Listed || brand.kind() != AliasKind::Brand {
            return Err(CascadeError::internal("alias tables passed in the wrong slots"));
        }

        let corrections = self
            .corrections
            .unwrap_or_else(|| Arc::new(CorrectionStore::in_memory()));
        let t = self.thresholds;

        let mut levels: Vec<Box<dyn ResolutionLevel>> = vec![
            Box::new(CorrectionLevel::new(
                Arc::clone(&corrections),
                t.user_correction,
            )),
            Box::new(AliasLevel::new(listed, t.listed_alias)),
            Box::new(AliasLevel::new(brand, t.brand_alias)),
        ];

        let directory = match self.directory {
            Some(store) => {
                let matcher = Arc::new(DirectoryMatcher::new(store, self.matcher_config)?);
                levels.push(Box::new(DirectoryLevel::new(
                    Arc::clone(&matcher),
                    t.directory,
                )));
                Some(matcher)
            }
            None => None,
        };

        info!(
            levels = levels.len() + 1,
            corrections = corrections.len(),
            directory = directory.is_some(),
            "cascade engine ready"
        );

        Ok(CascadeEngine {
            corrections,
            levels,
            directory,
            fallback,
            telemetry: Telemetry::default(),
        })
    }
}

//! # namecascade - Organization name resolution
//!
//! Resolves informal organization names ("トヨタ", "スタバ", "Acme Trading") to
//! canonical registered legal names by running an ordered cascade of matching
//! strategies. Each strategy reports a calibrated confidence, and the first
//! one to clear its level's acceptance threshold answers.
//!
//! ## Levels
//!
//! 1. **User corrections**: confirmed fixes, keyed by normalized query and
//!    persisted to an append-only log
//! 2. **Listed aliases**: curated well-known companies
//! 3. **Brand aliases**: curated brand and colloquial names
//! 4. **Directory**: exact, legal-form pattern, prefix and substring matches
//!    against a registry of canonical records
//! 5. **Fallback**: synthesizes a name from the query; always answers
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use namecascade::{CascadeEngine, DirectoryRecord, InMemoryDirectory, Source};
//!
//! let directory: InMemoryDirectory =
//!     std::iter::once(DirectoryRecord::new("Acme Trading", "1010001000001", "東京都")).collect();
//! let engine = CascadeEngine::builder()
//!     .directory(Arc::new(directory))
//!     .build()?;
//!
//! let result = engine.resolve("Acme Trading");
//! assert_eq!(result.source, Source::DirectoryExact);
//!
//! engine.record_correction("acme", &result.predicted_name, "Acme Trading")?;
//! assert_eq!(engine.resolve("ACME").source, Source::UserCorrection);
//! # Ok::<(), namecascade::CascadeError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod confidence;
pub mod error;
pub mod normalize;
pub mod result;

// Knowledge sources
pub mod alias;
pub mod correction;
pub mod directory;
pub mod fallback;

// Dispatch
pub mod config;
pub mod engine;

// Re-export primary types at crate root for convenience
pub use alias::{AliasEntry, AliasKind, AliasTable};
pub use confidence::Confidence;
pub use config::{
    AliasConfig, CascadeConfig, CorrectionConfig, DirectoryConfig, ThresholdConfig,
};
pub use correction::{CorrectionEntry, CorrectionMatch, CorrectionStore, MatchKind};
pub use directory::{
    AffixPattern, AffixPosition, DirectoryMatch, DirectoryMatcher, DirectoryRecord,
    DirectoryStore, InMemoryDirectory, MatcherConfig, StorageError,
};
#[cfg(feature = "sqlite")]
pub use directory::SqliteDirectory;
pub use engine::{CallerContext, CascadeEngine, CascadeEngineBuilder, ResolutionLevel, Statistics};
pub use error::{CascadeError, CascadeResult, ConfigError, CorrectionLogError, ValidationError};
pub use fallback::{FallbackConfig, FallbackSynthesizer};
pub use normalize::normalize;
pub use result::{Candidate, LevelKind, ResolutionResult, Source};

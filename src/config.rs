//! Engine configuration.
//!
//! Every field has a default, so an empty file is a valid configuration that
//! yields an in-memory correction store, the built-in alias tables, no
//! directory, and the stock thresholds.
//!
//! ```toml
//! [corrections]
//! log_path = "/var/lib/namecascade/corrections.log"
//!
//! [directory]
//! sqlite_path = "/var/lib/namecascade/corporate.db"
//! create_index = false
//! timeout_ms = 250
//!
//! [thresholds]
//! directory = 0.85
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::directory::{AffixPattern, MatcherConfig};
use crate::error::{ConfigError, ValidationError};
use crate::fallback::FallbackConfig;
use crate::result::LevelKind;

/// Correction store settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorrectionConfig {
    /// Durable log; absent keeps corrections in memory only.
    pub log_path: Option<PathBuf>,
    /// `fsync` after every append.
    pub sync_on_write: bool,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            log_path: None,
            sync_on_write: true,
        }
    }
}

/// Alias table overrides. Absent paths use the built-in tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AliasConfig {
    /// Listed-entity table.
    pub listed_path: Option<PathBuf>,
    /// Brand table.
    pub brand_path: Option<PathBuf>,
}

/// Directory settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DirectoryConfig {
    /// SQLite database; absent disables the directory level. The file must
    /// already exist and hold the `corporate_master` table.
    pub sqlite_path: Option<PathBuf>,
    /// Open the database read-write at startup to create the name index.
    /// Off by default: the engine never writes to the directory otherwise.
    pub create_index: bool,
    /// Budget for one whole match.
    pub timeout_ms: u64,
    /// Query worker threads.
    pub workers: usize,
    /// Queries allowed to wait for a worker.
    pub queue_capacity: usize,
    /// Candidates fetched by prefix and substring tiers.
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

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self::from(&MatcherConfig::default())
    }
}

impl From<&MatcherConfig> for DirectoryConfig {
    fn from(m: &MatcherConfig) -> Self {
        Self {
            sqlite_path: None,
            create_index: false,
            timeout_ms: u64::try_from(m.timeout.as_millis()).unwrap_or(u64::MAX),
            workers: m.workers,
            queue_capacity: m.queue_capacity,
            candidate_limit: m.candidate_limit,
            exact_confidence: m.exact_confidence,
            prefix_confidence: m.prefix_confidence,
            substring_confidence: m.substring_confidence,
            affixes: m.affixes.clone(),
        }
    }
}

impl DirectoryConfig {
    /// Matcher settings described by this section.
    #[must_use]
    pub fn matcher_config(&self) -> MatcherConfig {
        MatcherConfig {
            timeout: Duration::from_millis(self.timeout_ms),
            workers: self.workers,
            queue_capacity: self.queue_capacity,
            candidate_limit: self.candidate_limit,
            exact_confidence: self.exact_confidence,
            prefix_confidence: self.prefix_confidence,
            substring_confidence: self.substring_confidence,
            affixes: self.affixes.clone(),
        }
    }
}

/// Per-level acceptance thresholds. The fallback has none.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThresholdConfig {
    /// User corrections.
    pub user_correction: f32,
    /// Listed-entity aliases.
    pub listed_alias: f32,
    /// Brand aliases.
    pub brand_alias: f32,
    /// Directory matches.
    pub directory: f32,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            user_correction: 0.95,
            listed_alias: 0.95,
            brand_alias: 0.95,
            directory: 0.80,
        }
    }
}

impl ThresholdConfig {
    /// Threshold of `level`. The fallback accepts everything.
    #[must_use]
    pub const fn for_level(&self, level: LevelKind) -> f32 {
        match level {
            LevelKind::UserCorrection => self.user_correction,
            LevelKind::ListedAlias => self.listed_alias,
            LevelKind::BrandAlias => self.brand_alias,
            LevelKind::Directory => self.directory,
            LevelKind::Fallback => 0.0,
        }
    }

    /// Checks every threshold is in `[0, 1]`.
    ///
    /// # Errors
    /// `ThresholdOutOfRange` naming the first bad level.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for level in LevelKind::ALL {
            let value = self.for_level(level);
            if value.is_nan() || !(0.0..=1.0).contains(&value) {
                return Err(ValidationError::ThresholdOutOfRange {
                    level: level.to_string(),
                    value,
                });
            }
        }
        Ok(())
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CascadeConfig {
    /// Correction store.
    pub corrections: CorrectionConfig,
    /// Alias tables.
    pub aliases: AliasConfig,
    /// Directory level.
    pub directory: DirectoryConfig,
    /// Acceptance thresholds.
    pub thresholds: ThresholdConfig,
    /// Fallback synthesis.
    pub fallback: FallbackConfig,
}

impl CascadeConfig {
    /// Parses and validates TOML text. `origin` names the text in errors.
    ///
    /// # Errors
    /// `Parse` for malformed TOML or unknown keys, `Invalid` for bad values.
    pub fn from_toml_str(text: &str, origin: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse {
            origin: origin.to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a TOML file.
    ///
    /// # Errors
    /// `Read` if the file cannot be read; otherwise as
    /// [`CascadeConfig::from_toml_str`].
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text, &path.display().to_string())
    }

    /// Validates all sections.
    ///
    /// # Errors
    /// Returns the first invalid value found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.thresholds.validate()?;
        self.directory.matcher_config().validate()?;
        self.fallback.validate()?;
        Ok(())
    }
}

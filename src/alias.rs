//! Static alias tables.
//!
//! Two curated tables map literal queries to canonical names: listed and
//! well-known companies, and brand or colloquial names. Lookup is a single
//! exact lookup with the raw query. Ambiguity is resolved by curation, so there
//! is no partial matching here.
//!
//! Tables are data, not code:
//! ```toml
//! table = "brand"
//!
//! [[alias]]
//! key = "スタバ"
//! canonical = "スターバックス コーヒー ジャパン株式会社"
//! confidence = 0.98
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use serde::Deserialize;

use crate::confidence::Confidence;
use crate::error::{ConfigError, ValidationError};

const BUILTIN_LISTED: &str = include_str!("../data/listed_aliases.toml");
const BUILTIN_BRAND: &str = include_str!("../data/brand_aliases.toml");

/// Which alias table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AliasKind {
    /// Listed/well-known entities.
    Listed,
    /// Brand and colloquial names.
    Brand,
}

impl AliasKind {
    /// Stable lowercase name, as used in table files.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Listed => "listed",
            Self::Brand => "brand",
        }
    }
}

impl fmt::Display for AliasKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One curated mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct AliasEntry {
    /// Literal query this entry answers.
    pub match_key: String,
    /// Canonical legal name.
    pub canonical_name: String,
    /// Hand-assigned confidence.
    pub confidence: Confidence,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AliasFile {
    #[serde(default)]
    table: Option<String>,
    #[serde(default)]
    alias: Vec<AliasRow>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AliasRow {
    key: String,
    canonical: String,
    confidence: f32,
}

/// An immutable exact-match alias table.
#[derive(Debug, Clone)]
pub struct AliasTable {
    kind: AliasKind,
    entries: HashMap<String, AliasEntry>,
}

impl AliasTable {
    /// Creates an empty table.
    #[must_use]
    pub fn empty(kind: AliasKind) -> Self {
        Self {
            kind,
            entries: HashMap::new(),
        }
    }

    /// Builds a table from `(key, canonical, confidence)` triples.
    ///
    /// # Errors
    /// - `DuplicateAlias` if a key appears twice
    /// - `ConfidenceOutOfRange` for confidences outside [0, 1]
    /// - `MissingField` for blank keys or canonical names
    pub fn from_entries<I, K, C>(kind: AliasKind, rows: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = (K, C, f32)>,
        K: Into<String>,
        C: Into<String>,
    {
        let mut entries = HashMap::new();
        for (key, canonical, confidence) in rows {
            let key = key.into();
            let canonical = canonical.into();
            if key.is_empty() {
                return Err(ValidationError::MissingField {
                    field: format!("{kind}.key"),
                });
            }
            if canonical.trim().is_empty() {
                return Err(ValidationError::MissingField {
                    field: format!("{kind}.canonical ({key})"),
                });
            }
            let entry = AliasEntry {
                match_key: key.clone(),
                canonical_name: canonical,
                confidence: Confidence::new(confidence)?,
            };
            if entries.insert(key.clone(), entry).is_some() {
                return Err(ValidationError::DuplicateAlias {
                    table: kind.to_string(),
                    key,
                });
            }
        }
        Ok(Self { kind, entries })
    }

    /// Parses a table from TOML text. `origin` names the text in errors.
    ///
    /// # Errors
    /// Returns `ConfigError::Parse` for malformed TOML or a `table` field
    /// naming the other kind, and `ConfigError::Invalid` for bad rows.
    pub fn from_toml_str(kind: AliasKind, text: &str, origin: &str) -> Result<Self, ConfigError> {
        let file: AliasFile = toml::from_str(text).map_err(|e| ConfigError::Parse {
            origin: origin.to_string(),
            message: e.to_string(),
        })?;

        if let Some(declared) = file.table.as_deref() {
            if declared != kind.as_str() {
                return Err(ConfigError::Parse {
                    origin: origin.to_string(),
                    message: format!("declares table '{declared}' but was loaded as '{kind}'"),
                });
            }
        }

        let rows = file
            .alias
            .into_iter()
            .map(|row| (row.key, row.canonical, row.confidence));
        Ok(Self::from_entries(kind, rows)?)
    }

    /// Loads a table from a TOML file.
    ///
    /// # Errors
    /// See [`AliasTable::from_toml_str`]; also `ConfigError::Read`.
    pub fn from_file(kind: AliasKind, path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(kind, &text, &path.display().to_string())
    }

    /// The table shipped with the crate.
    ///
    /// # Errors
    /// Only if the bundled data file is malformed.
    pub fn builtin(kind: AliasKind) -> Result<Self, ConfigError> {
        match kind {
            AliasKind::Listed => Self::from_toml_str(kind, BUILTIN_LISTED, "builtin listed table"),
            AliasKind::Brand => Self::from_toml_str(kind, BUILTIN_BRAND, "builtin brand table"),
        }
    }

    /// Exact-match lookup with the literal query.
    #[must_use]
    pub fn get(&self, query: &str) -> Option<&AliasEntry> {
        self.entries.get(query)
    }

    /// Which table this is.
    #[must_use]
    pub const fn kind(&self) -> AliasKind {
        self.kind
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the table has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_tables_load() {
        let listed = AliasTable::builtin(AliasKind::Listed).unwrap();
        let brand = AliasTable::builtin(AliasKind::Brand).unwrap();
        assert!(!listed.is_empty());
        assert!(!brand.is_empty());

        let toyota = listed.get("トヨタ").unwrap();
        assert_eq!(toyota.canonical_name, "トヨタ自動車株式会社");
        assert!(toyota.confidence.value() >= 0.99);

        let starbucks = brand.get("スタバ").unwrap();
        assert_eq!(starbucks.canonical_name, "スターバックス コーヒー ジャパン株式会社");
    }

    #[test]
    fn test_builtin_calibration_floors() {
        let listed = AliasTable::builtin(AliasKind::Listed).unwrap();
        let brand = AliasTable::builtin(AliasKind::Brand).unwrap();
        assert!(listed.entries.values().all(|e| e.confidence.value() >= 0.99));
        assert!(brand.entries.values().all(|e| e.confidence.value() >= 0.95));
    }

    #[test]
    fn test_lookup_is_literal() {
        let table = AliasTable::from_entries(
            AliasKind::Brand,
            [("BrandX", "BrandX Holdings Inc", 0.98)],
        )
        .unwrap();
        assert!(table.get("BrandX").is_some());
        assert!(table.get("brandx").is_none());
        assert!(table.get(" BrandX").is_none());
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let err = AliasTable::from_entries(
            AliasKind::Listed,
            [("A", "A Corp", 0.99), ("A", "A Holdings", 0.99)],
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::DuplicateAlias { .. }));
    }

    #[test]
    fn test_confidence_out_of_range_rejected() {
        let text = "[[alias]]\nkey = \"A\"\ncanonical = \"A Corp\"\nconfidence = 1.5\n";
        let err = AliasTable::from_toml_str(AliasKind::Brand, text, "inline").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid(ValidationError::ConfidenceOutOfRange { .. })
        ));
    }

    #[test]
    fn test_table_kind_mismatch_rejected() {
        let text = "table = \"listed\"\n";
        let err = AliasTable::from_toml_str(AliasKind::Brand, text, "inline").unwrap_err();
        assert!(err.to_string().contains("declares table 'listed'"));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("brands.toml");
        std::fs::write(
            &path,
            "table = \"brand\"\n[[alias]]\nkey = \"GU\"\ncanonical = \"株式会社ジーユー\"\nconfidence = 0.99\n",
        )
        .unwrap();
        let table = AliasTable::from_file(AliasKind::Brand, &path).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.kind(), AliasKind::Brand);
    }
}

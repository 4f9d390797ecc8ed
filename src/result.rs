//! Resolution results and provenance tags.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::confidence::Confidence;
use crate::directory::DirectoryRecord;

/// Which strategy produced a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// A confirmed user correction.
    UserCorrection,
    /// The listed/well-known entity table.
    ListedAlias,
    /// The brand/colloquial name table.
    BrandAlias,
    /// Directory row whose name equals the query.
    DirectoryExact,
    /// Directory row equal to the query with a legal-form affix.
    DirectoryPattern,
    /// Directory row whose name starts with the query.
    DirectoryPrefix,
    /// Directory row whose name contains the query.
    DirectorySubstring,
    /// Synthesized by the fallback heuristic.
    FallbackSynthesized,
}

impl Source {
    /// All sources in cascade order.
    pub const ALL: [Self; 8] = [
        Self::UserCorrection,
        Self::ListedAlias,
        Self::BrandAlias,
        Self::DirectoryExact,
        Self::DirectoryPattern,
        Self::DirectoryPrefix,
        Self::DirectorySubstring,
        Self::FallbackSynthesized,
    ];

    /// Stable snake_case tag.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UserCorrection => "user_correction",
            Self::ListedAlias => "listed_alias",
            Self::BrandAlias => "brand_alias",
            Self::DirectoryExact => "directory_exact",
            Self::DirectoryPattern => "directory_pattern",
            Self::DirectoryPrefix => "directory_prefix",
            Self::DirectorySubstring => "directory_substring",
            Self::FallbackSynthesized => "fallback_synthesized",
        }
    }

    /// The cascade level this source belongs to.
    #[must_use]
    pub const fn level(self) -> LevelKind {
        match self {
            Self::UserCorrection => LevelKind::UserCorrection,
            Self::ListedAlias => LevelKind::ListedAlias,
            Self::BrandAlias => LevelKind::BrandAlias,
            Self::DirectoryExact
            | Self::DirectoryPattern
            | Self::DirectoryPrefix
            | Self::DirectorySubstring => LevelKind::Directory,
            Self::FallbackSynthesized => LevelKind::Fallback,
        }
    }

    pub(crate) const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A cascade level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelKind {
    /// Confirmed user corrections.
    UserCorrection,
    /// Listed/well-known entities.
    ListedAlias,
    /// Brand and colloquial names.
    BrandAlias,
    /// The directory record store (all four tiers).
    Directory,
    /// The terminal fallback.
    Fallback,
}

impl LevelKind {
    /// All levels in cascade order.
    pub const ALL: [Self; 5] = [
        Self::UserCorrection,
        Self::ListedAlias,
        Self::BrandAlias,
        Self::Directory,
        Self::Fallback,
    ];

    /// Stable snake_case tag.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UserCorrection => "user_correction",
            Self::ListedAlias => "listed_alias",
            Self::BrandAlias => "brand_alias",
            Self::Directory => "directory",
            Self::Fallback => "fallback",
        }
    }

    pub(crate) const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for LevelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A prediction proposed by one level, before the threshold check.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Predicted canonical name.
    pub predicted_name: String,
    /// Level-calibrated confidence.
    pub confidence: Confidence,
    /// Provenance tag.
    pub source: Source,
    /// Directory row backing the prediction, if any.
    pub record: Option<DirectoryRecord>,
}

impl Candidate {
    /// Creates a candidate not backed by a directory row.
    #[must_use]
    pub fn new(predicted_name: impl Into<String>, confidence: Confidence, source: Source) -> Self {
        Self {
            predicted_name: predicted_name.into(),
            confidence,
            source,
            record: None,
        }
    }
}

/// The answer returned by [`crate::CascadeEngine::resolve`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionResult {
    /// The raw query as given by the caller.
    pub query: String,
    /// Predicted canonical legal name.
    pub predicted_name: String,
    /// Confidence in `[0, 1]`.
    pub confidence: Confidence,
    /// Which strategy produced the prediction.
    pub source: Source,
    /// Wall-clock time of the whole cascade.
    pub latency_micros: u64,
    /// Registry number and region when the directory answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<DirectoryRecord>,
}

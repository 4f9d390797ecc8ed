//! Error types for namecascade.
//!
//! All errors are strongly typed using thiserror. Resolution itself never
//! fails (see [`crate::engine::CascadeEngine::resolve`]); these types surface
//! from construction, configuration loading and correction recording.

use std::path::PathBuf;

use thiserror::Error;

/// Validation errors that occur during input or configuration validation.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Confidence value {value} is out of range [0.0, 1.0]")]
    ConfidenceOutOfRange {
        value: f32,
    },

    #[error("Threshold for level '{level}' is out of range [0.0, 1.0]: {value}")]
    ThresholdOutOfRange {
        level: String,
        value: f32,
    },

    #[error("Query normalizes to an empty key")]
    EmptyQuery,

    #[error("Canonical name cannot be empty")]
    EmptyCanonicalName,

    #[error("Duplicate alias key '{key}' in {table} table")]
    DuplicateAlias {
        table: String,
        key: String,
    },

    #[error("Field '{field}' must be greater than zero")]
    ZeroValue {
        field: String,
    },

    #[error("Required field '{field}' is missing")]
    MissingField {
        field: String,
    },
}

/// Failures of the durable correction log.
#[derive(Debug, Error)]
pub enum CorrectionLogError {
    #[error("Correction log I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Correction log {path} is locked by another process")]
    Locked {
        path: PathBuf,
    },

    #[error("Failed to encode correction entry: {message}")]
    Encode {
        message: String,
    },

    #[error("Correction store lock poisoned: {context}")]
    Poisoned {
        context: &'static str,
    },
}

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {origin}: {message}")]
    Parse {
        origin: String,
        message: String,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] ValidationError),
}

/// Top-level error type for namecascade.
#[derive(Debug, Error)]
pub enum CascadeError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Correction log error: {0}")]
    CorrectionLog(#[from] CorrectionLogError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Directory store error: {0}")]
    Directory(#[from] crate::directory::StorageError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl CascadeError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if retrying the same call may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::CorrectionLog(e) => matches!(
                e,
                CorrectionLogError::Io { .. } | CorrectionLogError::Locked { .. }
            ),
            Self::Directory(e) => e.is_transient(),
            Self::Validation(_) | Self::Config(_) | Self::Internal { .. } => false,
        }
    }
}

/// Result type alias for namecascade operations.
pub type CascadeResult<T> = Result<T, CascadeError>;

//! The read contract the cascade needs from a directory record store.
//!
//! Backends own the data and its indexes; the engine only reads. A store is
//! expected to hold millions of rows indexed on canonical name, so exact and
//! prefix lookups must be sub-linear.

use std::thread::ThreadId;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A canonical organization record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DirectoryRecord {
    /// Registered legal name.
    pub canonical_name: String,
    /// Registry identifier (corporate number); empty when unknown.
    pub registry_number: String,
    /// Region of registration; empty when unknown.
    pub region: String,
}

impl DirectoryRecord {
    /// Creates a record.
    #[must_use]
    pub fn new(
        canonical_name: impl Into<String>,
        registry_number: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            canonical_name: canonical_name.into(),
            registry_number: registry_number.into(),
            region: region.into(),
        }
    }

    /// Sort key used for every "shortest name wins" tie-break: character
    /// length, then name in byte order.
    pub(crate) fn specificity_key(&self) -> (usize, &str) {
        (self.canonical_name.chars().count(), self.canonical_name.as_str())
    }
}

/// Errors that can occur while querying a directory store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend error.
    #[error("Directory backend error: {0}")]
    BackendError(String),

    /// The store could not be reached.
    #[error("Directory connection error: {0}")]
    ConnectionError(String),

    /// The query did not finish within its budget.
    #[error("Directory query timed out after {duration_ms}ms")]
    Timeout {
        /// Budget that was exhausted.
        duration_ms: u64,
    },

    /// Too many queries already in flight.
    #[error("Directory query queue full (capacity {capacity})")]
    QueueFull {
        /// Queue capacity.
        capacity: usize,
    },

    /// The worker answering the query went away.
    #[error("Directory query worker disconnected")]
    Disconnected,
}

impl StorageError {
    /// Returns true if the same query may succeed later.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConnectionError(_) | Self::Timeout { .. } | Self::QueueFull { .. }
        )
    }
}

/// Read-only directory record store.
///
/// Candidate lists from `find_prefix` and `find_substring` must be ordered by
/// name length in characters, then by name in byte order, and truncated to
/// `limit`. All matching is case-sensitive on the stored name.
pub trait DirectoryStore: Send + Sync {
    /// Record whose name equals `name`.
    fn find_exact(&self, name: &str) -> Result<Option<DirectoryRecord>, StorageError>;

    /// Records whose name equals any of `names`, in one round trip.
    fn find_exact_any(&self, names: &[String]) -> Result<Vec<DirectoryRecord>, StorageError>;

    /// Records whose name starts with `prefix`.
    fn find_prefix(&self, prefix: &str, limit: usize) -> Result<Vec<DirectoryRecord>, StorageError>;

    /// Records whose name contains `fragment`.
    fn find_substring(
        &self,
        fragment: &str,
        limit: usize,
    ) -> Result<Vec<DirectoryRecord>, StorageError>;

    /// Total number of records.
    fn record_count(&self) -> Result<u64, StorageError>;

    /// Called when nobody waits any longer for the query running on
    /// `worker`. Stores that can abort an in-flight statement should do so;
    /// the default does nothing and the query runs to completion.
    fn interrupt(&self, _worker: ThreadId) {}
}

//! The correction store: confirmed user corrections keyed by normalized query.

use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::confidence::Confidence;
use crate::error::{CascadeResult, CorrectionLogError, ValidationError};
use crate::normalize::normalize;

use super::codec::LogRecord;
use super::log::CorrectionLog;

/// Confidence of a containment (non-exact) match.
pub const CONTAINMENT_CONFIDENCE: f32 = 0.95;

/// A confirmed correction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionEntry {
    /// `normalize(original_query)`.
    pub normalized_key: String,
    /// The confirmed canonical name.
    pub canonical_name: String,
    /// The query as the user typed it.
    pub original_query: String,
    /// What the cascade predicted before the correction.
    pub source_prediction: String,
    /// Always 1.0 for a stored correction.
    pub confidence: Confidence,
    /// When the correction was recorded.
    pub recorded_at: DateTime<Utc>,
}

impl CorrectionEntry {
    fn from_record(record: LogRecord) -> Option<Self> {
        let normalized_key = normalize(&record.original_query);
        if normalized_key.is_empty() || record.canonical_name.trim().is_empty() {
            return None;
        }
        Some(Self {
            normalized_key,
            canonical_name: record.canonical_name,
            original_query: record.original_query,
            source_prediction: record.predicted_name,
            confidence: Confidence::ONE,
            recorded_at: record.recorded_at,
        })
    }

    fn to_record(&self) -> LogRecord {
        LogRecord {
            original_query: self.original_query.clone(),
            predicted_name: self.source_prediction.clone(),
            canonical_name: self.canonical_name.clone(),
            recorded_at: self.recorded_at,
        }
    }
}

/// How a lookup matched a stored key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// The normalized query equals the stored key.
    Exact,
    /// One of the two contains the other.
    Containment,
}

/// Result of [`CorrectionStore::lookup`].
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionMatch {
    /// The matched entry.
    pub entry: CorrectionEntry,
    /// 1.0 for exact matches, [`CONTAINMENT_CONFIDENCE`] otherwise.
    pub confidence: Confidence,
    /// How the key matched.
    pub kind: MatchKind,
}

/// Entries in first-insertion order plus a key index.
///
/// Overwriting a key keeps its original position so containment tie-breaks
/// stay stable across rewrites and restarts.
#[derive(Debug, Default)]
struct CorrectionIndex {
    entries: Vec<CorrectionEntry>,
    by_key: HashMap<String, usize>,
}

impl CorrectionIndex {
    fn upsert(&mut self, entry: CorrectionEntry) {
        if let Some(&slot) = self.by_key.get(&entry.normalized_key) {
            self.entries[slot] = entry;
        } else {
            self.by_key.insert(entry.normalized_key.clone(), self.entries.len());
            self.entries.push(entry);
        }
    }

    fn exact(&self, key: &str) -> Option<&CorrectionEntry> {
        self.by_key.get(key).map(|&slot| &self.entries[slot])
    }

    /// Longest stored key contained in, or containing, `key`; ties go to the
    /// earliest inserted key.
    fn containment(&self, key: &str) -> Option<&CorrectionEntry> {
        if key.is_empty() {
            return None;
        }
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| {
                let stored = e.normalized_key.as_str();
                !stored.is_empty() && (key.contains(stored) || stored.contains(key))
            })
            .max_by_key(|(slot, e)| (e.normalized_key.chars().count(), std::cmp::Reverse(*slot)))
            .map(|(_, e)| e)
    }
}

/// In-memory correction map with an optional durable log.
///
/// Reads run concurrently. `record` holds the write lock across the log append
/// and the map update, so writers are serialized and readers never observe a
/// correction that is not yet durable.
#[derive(Debug)]
pub struct CorrectionStore {
    index: RwLock<CorrectionIndex>,
    log: Option<CorrectionLog>,
    skipped_on_replay: usize,
}

impl CorrectionStore {
    /// Creates a store without durability.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            index: RwLock::new(CorrectionIndex::default()),
            log: None,
            skipped_on_replay: 0,
        }
    }

    /// Opens the log at `path`, replaying it in file order.
    ///
    /// Later entries overwrite earlier ones for the same key; malformed lines
    /// are skipped.
    ///
    /// # Errors
    /// Returns an error if the log cannot be opened or is locked by another
    /// process.
    pub fn open(path: impl AsRef<Path>, sync_on_write: bool) -> Result<Self, CorrectionLogError> {
        let (log, replay) = CorrectionLog::open(path.as_ref(), sync_on_write)?;

        let mut index = CorrectionIndex::default();
        let mut skipped = replay.skipped;
        for record in replay.records {
            match CorrectionEntry::from_record(record) {
                Some(entry) => index.upsert(entry),
                None => skipped += 1,
            }
        }

        info!(
            path = %log.path().display(),
            corrections = index.entries.len(),
            skipped,
            "correction log replayed"
        );

        Ok(Self {
            index: RwLock::new(index),
            log: Some(log),
            skipped_on_replay: skipped,
        })
    }

    /// Records a confirmed correction.
    ///
    /// The log append happens first; if it fails the map is unchanged.
    ///
    /// # Errors
    /// - `EmptyQuery` / `EmptyCanonicalName` for blank input
    /// - Correction log errors if the append fails
    pub fn record(
        &self,
        original_query: &str,
        predicted_name: &str,
        canonical_name: &str,
    ) -> CascadeResult<CorrectionEntry> {
        let normalized_key = normalize(original_query);
        if normalized_key.is_empty() {
            return Err(ValidationError::EmptyQuery.into());
        }
        if canonical_name.trim().is_empty() {
            return Err(ValidationError::EmptyCanonicalName.into());
        }

        let entry = CorrectionEntry {
            normalized_key,
            canonical_name: canonical_name.to_string(),
            original_query: original_query.to_string(),
            source_prediction: predicted_name.to_string(),
            confidence: Confidence::ONE,
            recorded_at: Utc::now(),
        };

        let mut index = self.index.write().map_err(|_| CorrectionLogError::Poisoned {
            context: "correction.record",
        })?;
        if let Some(log) = &self.log {
            log.append(&entry.to_record())?;
        }
        index.upsert(entry.clone());

        debug!(key = %entry.normalized_key, canonical = %entry.canonical_name, "correction recorded");
        Ok(entry)
    }

    /// Looks up a raw query.
    ///
    /// # Errors
    /// Returns `Poisoned` if a writer panicked while holding the lock.
    pub fn lookup(&self, query: &str) -> Result<Option<CorrectionMatch>, CorrectionLogError> {
        self.lookup_normalized(&normalize(query))
    }

    /// Looks up an already-normalized key.
    ///
    /// # Errors
    /// Returns `Poisoned` if a writer panicked while holding the lock.
    pub fn lookup_normalized(&self, key: &str) -> Result<Option<CorrectionMatch>, CorrectionLogError> {
        let index = self.index.read().map_err(|_| CorrectionLogError::Poisoned {
            context: "correction.lookup",
        })?;

        if let Some(entry) = index.exact(key) {
            return Ok(Some(CorrectionMatch {
                entry: entry.clone(),
                confidence: Confidence::ONE,
                kind: MatchKind::Exact,
            }));
        }

        Ok(index.containment(key).map(|entry| CorrectionMatch {
            entry: entry.clone(),
            confidence: Confidence::calibrated(CONTAINMENT_CONFIDENCE),
            kind: MatchKind::Containment,
        }))
    }

    /// Rewrites the log so it holds only the live entry per key.
    ///
    /// Returns the number of entries written. A no-op for in-memory stores.
    ///
    /// # Errors
    /// Returns a log error if the rewrite fails; the old log stays valid.
    pub fn compact(&self) -> Result<usize, CorrectionLogError> {
        let index = self.index.write().map_err(|_| CorrectionLogError::Poisoned {
            context: "correction.compact",
        })?;
        let Some(log) = &self.log else {
            return Ok(index.entries.len());
        };

        let records: Vec<LogRecord> = index.entries.iter().map(CorrectionEntry::to_record).collect();
        log.rewrite(&records)?;
        info!(path = %log.path().display(), entries = records.len(), "correction log compacted");
        Ok(records.len())
    }

    /// Number of distinct corrected keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.read().map(|i| i.entries.len()).unwrap_or(0)
    }

    /// Returns true if no corrections are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Log lines skipped during replay.
    #[must_use]
    pub const fn skipped_on_replay(&self) -> usize {
        self.skipped_on_replay
    }

    /// Snapshot of all entries in first-insertion order.
    #[must_use]
    pub fn entries(&self) -> Vec<CorrectionEntry> {
        self.index
            .read()
            .map(|i| i.entries.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_exact_lookup_after_record() {
        let store = CorrectionStore::in_memory();
        store.record("ABC", "X", "Y").unwrap();

        let hit = store.lookup("abc").unwrap().unwrap();
        assert_eq!(hit.kind, MatchKind::Exact);
        assert_eq!(hit.confidence, Confidence::ONE);
        assert_eq!(hit.entry.canonical_name, "Y");
        assert_eq!(hit.entry.source_prediction, "X");
    }

    #[test]
    fn test_last_write_wins() {
        let store = CorrectionStore::in_memory();
        store.record("Acme", "", "Acme Ltd").unwrap();
        store.record("ACME", "", "Acme Holdings Inc").unwrap();

        assert_eq!(store.len(), 1);
        let hit = store.lookup("acme").unwrap().unwrap();
        assert_eq!(hit.entry.canonical_name, "Acme Holdings Inc");
    }

    #[test]
    fn test_containment_both_directions() {
        let store = CorrectionStore::in_memory();
        store.record("widgets", "", "Widgets Group LLC").unwrap();

        let longer = store.lookup("Blue Widgets Inc").unwrap().unwrap();
        assert_eq!(longer.kind, MatchKind::Containment);
        assert_eq!(longer.confidence.value(), CONTAINMENT_CONFIDENCE);

        let shorter = store.lookup("widget").unwrap().unwrap();
        assert_eq!(shorter.entry.canonical_name, "Widgets Group LLC");
    }

    #[test]
    fn test_containment_prefers_longest_then_earliest() {
        let store = CorrectionStore::in_memory();
        store.record("abc", "", "first").unwrap();
        store.record("xyz", "", "second").unwrap();
        store.record("abcd", "", "longest").unwrap();

        let hit = store.lookup("abcdxyz").unwrap().unwrap();
        assert_eq!(hit.entry.canonical_name, "longest");

        let store = CorrectionStore::in_memory();
        store.record("abc", "", "first").unwrap();
        store.record("xyz", "", "second").unwrap();
        let hit = store.lookup("abcxyz").unwrap().unwrap();
        assert_eq!(hit.entry.canonical_name, "first");
    }

    #[test]
    fn test_empty_query_matches_nothing() {
        let store = CorrectionStore::in_memory();
        store.record("abc", "", "first").unwrap();
        assert!(store.lookup("   ").unwrap().is_none());
    }

    #[test]
    fn test_rejects_blank_input() {
        let store = CorrectionStore::in_memory();
        let err = store.record("\u{3000}", "", "Y").unwrap_err();
        assert!(err.is_validation());
        let err = store.record("abc", "", " ").unwrap_err();
        assert!(err.is_validation());
        assert!(store.is_empty());
    }

    #[test]
    fn test_replay_preserves_last_write_and_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("corrections.log");

        {
            let store = CorrectionStore::open(&path, false).unwrap();
            store.record("abc", "", "first").unwrap();
            store.record("xyz", "", "second").unwrap();
            store.record("ABC", "", "first-updated").unwrap();
        }

        let store = CorrectionStore::open(&path, false).unwrap();
        let entries = store.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].normalized_key, "abc");
        assert_eq!(entries[0].canonical_name, "first-updated");
        assert_eq!(entries[1].canonical_name, "second");
    }

    #[test]
    fn test_compact_keeps_live_entries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("corrections.log");

        {
            let store = CorrectionStore::open(&path, false).unwrap();
            for i in 0..5 {
                store.record("abc", "", &format!("v{i}")).unwrap();
            }
            assert_eq!(store.compact().unwrap(), 1);
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 1);
        let store = CorrectionStore::open(&path, false).unwrap();
        assert_eq!(store.lookup("abc").unwrap().unwrap().entry.canonical_name, "v4");
    }
}

//! In-memory directory store.
//!
//! Intended for embedded usage, tests, and as a reference implementation of
//! the [`DirectoryStore`] ordering contract. Names live in a `BTreeMap`, so
//! exact and prefix lookups are range scans; substring lookup is linear.

use std::collections::BTreeMap;

use super::traits::{DirectoryRecord, DirectoryStore, StorageError};

/// Directory store backed by an ordered map.
#[derive(Debug, Default, Clone)]
pub struct InMemoryDirectory {
    by_name: BTreeMap<String, Vec<DirectoryRecord>>,
    len: usize,
}

impl InMemoryDirectory {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a record. Records sharing a name are kept in insertion order.
    pub fn insert(&mut self, record: DirectoryRecord) {
        self.by_name
            .entry(record.canonical_name.clone())
            .or_default()
            .push(record);
        self.len += 1;
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn ranked(mut found: Vec<DirectoryRecord>, limit: usize) -> Vec<DirectoryRecord> {
        found.sort_by(|a, b| a.specificity_key().cmp(&b.specificity_key()));
        found.truncate(limit);
        found
    }
}

impl FromIterator<DirectoryRecord> for InMemoryDirectory {
    fn from_iter<T: IntoIterator<Item = DirectoryRecord>>(iter: T) -> Self {
        let mut store = Self::new();
        for record in iter {
            store.insert(record);
        }
        store
    }
}

impl DirectoryStore for InMemoryDirectory {
    fn find_exact(&self, name: &str) -> Result<Option<DirectoryRecord>, StorageError> {
        Ok(self.by_name.get(name).and_then(|rs| rs.first()).cloned())
    }

    fn find_exact_any(&self, names: &[String]) -> Result<Vec<DirectoryRecord>, StorageError> {
        Ok(names
            .iter()
            .filter_map(|name| self.by_name.get(name).and_then(|rs| rs.first()))
            .cloned()
            .collect())
    }

    fn find_prefix(&self, prefix: &str, limit: usize) -> Result<Vec<DirectoryRecord>, StorageError> {
        let found = self
            .by_name
            .range::<str, _>((std::ops::Bound::Included(prefix), std::ops::Bound::Unbounded))
            .take_while(|(name, _)| name.starts_with(prefix))
            .flat_map(|(_, rs)| rs.iter().cloned())
            .collect();
        Ok(Self::ranked(found, limit))
    }

    fn find_substring(
        &self,
        fragment: &str,
        limit: usize,
    ) -> Result<Vec<DirectoryRecord>, StorageError> {
        let found = self
            .by_name
            .iter()
            .filter(|(name, _)| name.contains(fragment))
            .flat_map(|(_, rs)| rs.iter().cloned())
            .collect();
        Ok(Self::ranked(found, limit))
    }

    fn record_count(&self) -> Result<u64, StorageError> {
        Ok(self.len as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> InMemoryDirectory {
        [
            ("Acme Trading", "1000000000001", "Tokyo"),
            ("Acme Trading Holdings", "1000000000002", "Osaka"),
            ("Acme", "1000000000003", "Tokyo"),
            ("Best Acme Tools", "1000000000004", "Kyoto"),
            ("Acmf", "1000000000005", "Nagoya"),
        ]
        .into_iter()
        .map(|(n, r, p)| DirectoryRecord::new(n, r, p))
        .collect()
    }

    #[test]
    fn test_exact() {
        let s = store();
        assert_eq!(s.find_exact("Acme").unwrap().unwrap().registry_number, "1000000000003");
        assert!(s.find_exact("acme").unwrap().is_none());
    }

    #[test]
    fn test_exact_any_skips_missing() {
        let s = store();
        let found = s
            .find_exact_any(&["Nope".to_string(), "Acmf".to_string()])
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].canonical_name, "Acmf");
    }

    #[test]
    fn test_prefix_is_ordered_and_bounded() {
        let s = store();
        let found = s.find_prefix("Acme", 10).unwrap();
        let names: Vec<_> = found.iter().map(|r| r.canonical_name.as_str()).collect();
        assert_eq!(names, ["Acme", "Acme Trading", "Acme Trading Holdings"]);

        assert_eq!(s.find_prefix("Acme", 1).unwrap().len(), 1);
    }

    #[test]
    fn test_substring() {
        let s = store();
        let found = s.find_substring("cme T", 10).unwrap();
        let names: Vec<_> = found.iter().map(|r| r.canonical_name.as_str()).collect();
        assert_eq!(names, ["Acme Trading", "Best Acme Tools", "Acme Trading Holdings"]);
    }

    #[test]
    fn test_duplicate_names_counted() {
        let mut s = store();
        s.insert(DirectoryRecord::new("Acme", "2000000000000", "Sapporo"));
        assert_eq!(s.len(), 6);
        assert_eq!(s.record_count().unwrap(), 6);
        // First inserted row answers exact lookups.
        assert_eq!(s.find_exact("Acme").unwrap().unwrap().region, "Tokyo");
    }
}

//! Per-engine telemetry.
//!
//! Counters are plain atomics updated with relaxed ordering. A snapshot is
//! not a consistent cut across counters, which is fine for reporting.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::result::{LevelKind, Source};

#[derive(Debug, Default)]
pub(crate) struct Telemetry {
    total_calls: AtomicU64,
    accepted: [AtomicU64; LevelKind::ALL.len()],
    by_source: [AtomicU64; Source::ALL.len()],
    rejected: [AtomicU64; LevelKind::ALL.len()],
    directory_failures: AtomicU64,
    latency_micros_sum: AtomicU64,
}

impl Telemetry {
    pub(crate) fn record_accepted(&self, source: Source, latency_micros: u64) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        self.accepted[source.level().index()].fetch_add(1, Ordering::Relaxed);
        self.by_source[source.index()].fetch_add(1, Ordering::Relaxed);
        self.latency_micros_sum
            .fetch_add(latency_micros, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self, level: LevelKind) {
        self.rejected[level.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_directory_failure(&self) {
        self.directory_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, corrections: usize, directory_records: Option<u64>) -> Statistics {
        let total_calls = self.total_calls.load(Ordering::Relaxed);
        let latency_sum = self.latency_micros_sum.load(Ordering::Relaxed);
        #[allow(clippy::cast_precision_loss)]
        let average_latency_micros = if total_calls == 0 {
            0.0
        } else {
            latency_sum as f64 / total_calls as f64
        };

        Statistics {
            total_calls,
            per_level: LevelKind::ALL
                .iter()
                .map(|&l| (l, self.accepted[l.index()].load(Ordering::Relaxed)))
                .collect(),
            per_source: Source::ALL
                .iter()
                .map(|&s| (s, self.by_source[s.index()].load(Ordering::Relaxed)))
                .collect(),
            rejected: LevelKind::ALL
                .iter()
                .map(|&l| (l, self.rejected[l.index()].load(Ordering::Relaxed)))
                .collect(),
            directory_failures: self.directory_failures.load(Ordering::Relaxed),
            average_latency_micros,
            corrections,
            directory_records,
        }
    }
}

/// Point-in-time counters of one engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    /// Completed `resolve` calls.
    pub total_calls: u64,
    /// Accepted results per level.
    pub per_level: BTreeMap<LevelKind, u64>,
    /// Accepted results per source tag.
    pub per_source: BTreeMap<Source, u64>,
    /// Candidates discarded for missing their level's threshold.
    pub rejected: BTreeMap<LevelKind, u64>,
    /// Directory lookups that failed or timed out.
    pub directory_failures: u64,
    /// Mean cascade latency.
    pub average_latency_micros: f64,
    /// Distinct corrected keys.
    pub corrections: usize,
    /// Directory size, when a directory is attached and answered.
    pub directory_records: Option<u64>,
}

impl Statistics {
    /// Share of calls answered by `level`, in percent.
    #[must_use]
    pub fn level_share(&self, level: LevelKind) -> f64 {
        if self.total_calls == 0 {
            return 0.0;
        }
        let hits = self.per_level.get(&level).copied().unwrap_or(0);
        #[allow(clippy::cast_precision_loss)]
        let share = hits as f64 * 100.0 / self.total_calls as f64;
        share
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_counts() {
        let t = Telemetry::default();
        t.record_accepted(Source::DirectoryPrefix, 100);
        t.record_accepted(Source::DirectoryExact, 300);
        t.record_accepted(Source::FallbackSynthesized, 200);
        t.record_rejected(LevelKind::Directory);
        t.record_directory_failure();

        let s = t.snapshot(4, Some(10));
        assert_eq!(s.total_calls, 3);
        assert_eq!(s.per_level[&LevelKind::Directory], 2);
        assert_eq!(s.per_level[&LevelKind::Fallback], 1);
        assert_eq!(s.per_level[&LevelKind::UserCorrection], 0);
        assert_eq!(s.per_source[&Source::DirectoryPrefix], 1);
        assert_eq!(s.rejected[&LevelKind::Directory], 1);
        assert_eq!(s.directory_failures, 1);
        assert!((s.average_latency_micros - 200.0).abs() < 1e-9);
        assert_eq!(s.corrections, 4);
        assert_eq!(s.directory_records, Some(10));
    }

    #[test]
    fn test_empty_snapshot() {
        let s = Telemetry::default().snapshot(0, None);
        assert_eq!(s.total_calls, 0);
        assert!(s.average_latency_micros.abs() < f64::EPSILON);
        assert!(s.level_share(LevelKind::Fallback).abs() < f64::EPSILON);
    }

    #[test]
    fn test_level_share_and_json_keys() {
        let t = Telemetry::default();
        t.record_accepted(Source::BrandAlias, 1);
        t.record_accepted(Source::FallbackSynthesized, 1);
        let s = t.snapshot(0, None);
        assert!((s.level_share(LevelKind::BrandAlias) - 50.0).abs() < 1e-9);

        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["per_level"]["brand_alias"], 1);
        assert_eq!(json["per_source"]["fallback_synthesized"], 1);
    }
}

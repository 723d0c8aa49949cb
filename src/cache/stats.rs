//! Cache Statistics Module
//!
//! Counts hits, misses, writes and sweeps. Only counters live in process;
//! records are always read from the backing table.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::cache::SweepReport;

// == Cache Stats ==
/// Snapshot of the store counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Reads that found a live record
    pub hits: u64,
    /// Reads that found nothing (absent or just swept)
    pub misses: u64,
    /// Successful `set` calls
    pub writes: u64,
    /// Successful `delete` calls that removed a record
    pub deletes: u64,
    /// Records removed by the age sweep
    pub expired: u64,
    /// Records removed by the threshold sweep
    pub evicted: u64,
}

impl CacheStats {
    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no reads have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

// == Stats Recorder ==
/// Lock-free counters shared by concurrent store operations.
#[derive(Debug, Default)]
pub struct StatsRecorder {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
    expired: AtomicU64,
    evicted: AtomicU64,
}

impl StatsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    // == Record Sweep ==
    /// Adds the rows removed by a committed sweep.
    pub fn record_sweep(&self, report: SweepReport) {
        if report.expired > 0 {
            self.expired.fetch_add(report.expired, Ordering::Relaxed);
        }
        if report.evicted > 0 {
            self.evicted.fetch_add(report.evicted, Ordering::Relaxed);
        }
    }

    // == Snapshot ==
    pub fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_new() {
        let stats = StatsRecorder::new().snapshot();
        assert_eq!(stats, CacheStats::default());
    }

    #[test]
    fn test_hit_rate_no_requests() {
        let stats = CacheStats::default();
        assert_eq!(stats.hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate_mixed() {
        let recorder = StatsRecorder::new();
        recorder.record_hit();
        recorder.record_hit();
        recorder.record_hit();
        recorder.record_miss();
        assert_eq!(recorder.snapshot().hit_rate(), 0.75);
    }

    #[test]
    fn test_record_sweep() {
        let recorder = StatsRecorder::new();
        recorder.record_sweep(SweepReport { expired: 2, evicted: 1 });
        recorder.record_sweep(SweepReport { expired: 0, evicted: 4 });

        let stats = recorder.snapshot();
        assert_eq!(stats.expired, 2);
        assert_eq!(stats.evicted, 5);
    }

    #[test]
    fn test_record_writes_and_deletes() {
        let recorder = StatsRecorder::new();
        recorder.record_write();
        recorder.record_write();
        recorder.record_delete();

        let stats = recorder.snapshot();
        assert_eq!(stats.writes, 2);
        assert_eq!(stats.deletes, 1);
    }
}

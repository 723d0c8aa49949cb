//! Eviction Policy Module
//!
//! Decides which live records go once the table holds more than the
//! configured threshold: oldest-touched first. The age sweep itself is a
//! single SQL statement (see `TableSql::sweep_expired`).

use std::cmp::Ordering;
use std::ops::AddAssign;

use serde::Serialize;

use crate::cache::RecordMeta;

// == Sweep Report ==
/// Rows removed by one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Removed because `touched + expires <= now`
    pub expired: u64,
    /// Removed because the live count exceeded the threshold
    pub evicted: u64,
}

impl SweepReport {
    pub fn total(&self) -> u64 {
        self.expired + self.evicted
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

impl AddAssign for SweepReport {
    fn add_assign(&mut self, rhs: Self) {
        self.expired += rhs.expired;
        self.evicted += rhs.evicted;
    }
}

// == Eviction Policy ==
/// Threshold rule, free of any I/O.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionPolicy {
    threshold: Option<usize>,
}

/// Eviction order: oldest `touched` first, key as the tie-break.
fn oldest_first(a: &RecordMeta, b: &RecordMeta) -> Ordering {
    a.touched.cmp(&b.touched).then_with(|| a.key.cmp(&b.key))
}

impl EvictionPolicy {
    // == Constructor ==
    /// `threshold` is the maximum live record count, None = unbounded.
    pub fn new(threshold: Option<usize>) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> Option<usize> {
        self.threshold
    }

    // == Excess ==
    /// Number of records to evict when `live` records remain after the age sweep.
    pub fn excess(&self, live: usize) -> usize {
        match self.threshold {
            Some(limit) => live.saturating_sub(limit),
            None => 0,
        }
    }

    // == Select Overflow ==
    /// Picks `excess` victims from `candidates`, oldest first.
    ///
    /// `protect` names a key that must survive (the one just written).
    /// Candidates need not be sorted.
    pub fn select_overflow(
        &self,
        candidates: &[RecordMeta],
        excess: usize,
        protect: Option<&str>,
    ) -> Vec<String> {
        let mut ordered: Vec<&RecordMeta> = candidates
            .iter()
            .filter(|meta| Some(meta.key.as_str()) != protect)
            .collect();
        ordered.sort_by(|a, b| oldest_first(a, b));

        ordered
            .into_iter()
            .take(excess)
            .map(|meta| meta.key.clone())
            .collect()
    }
}

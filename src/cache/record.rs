//! Cache Record Module
//!
//! Row metadata for the backing table and the clock that stamps it.

use std::fmt::Debug;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use serde::Serialize;

// == Record Metadata ==
/// Bookkeeping columns of one stored record (the payload is left out).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordMeta {
    /// Primary key
    pub key: String,
    /// Seconds to live measured from `touched`, None = never expires by age
    pub expires: Option<i64>,
    /// Last write or successful read (Unix milliseconds)
    pub touched: i64,
}

impl RecordMeta {
    pub fn new(key: impl Into<String>, expires: Option<i64>, touched: i64) -> Self {
        Self {
            key: key.into(),
            expires,
            touched,
        }
    }

    // == Expires At ==
    /// Expiry instant in Unix milliseconds, or None if the record never expires.
    pub fn expires_at(&self) -> Option<i64> {
        self.expires
            .map(|secs| self.touched.saturating_add(secs.saturating_mul(1000)))
    }

    // == Is Expired ==
    /// Checks if the record has expired at `now_ms`.
    ///
    /// Boundary condition: a record whose expiry instant equals `now_ms` is
    /// already expired, matching the `<=` predicate used by the SQL sweep.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        match self.expires_at() {
            Some(at) => at <= now_ms,
            None => false,
        }
    }

    // == Time To Live ==
    /// Remaining lifetime in milliseconds; `Some(0)` once expired.
    pub fn ttl_remaining_ms(&self, now_ms: i64) -> Option<i64> {
        self.expires_at().map(|at| (at - now_ms).max(0))
    }
}

// == Clock ==
/// Source of the `touched` timestamps and of "now" for expiry checks.
pub trait Clock: Send + Sync + Debug {
    /// Current time in Unix milliseconds.
    fn now_ms(&self) -> i64;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Clock that only moves when told to. Used to make expiry and eviction
/// order deterministic.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: AtomicI64::new(start_ms),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

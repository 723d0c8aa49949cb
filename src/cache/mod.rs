//! Cache Module
//!
//! Persistent key/value cache over a relational table, with TTL expiry and
//! threshold eviction applied on every operation.

mod codec;
mod eviction;
mod record;
mod schema;
mod stats;
mod store;


// Re-export public types
pub use codec::{Codec, JsonCodec};
pub use eviction::{EvictionPolicy, SweepReport};
pub use record::{Clock, ManualClock, RecordMeta, SystemClock};
pub use schema::TableSql;
pub use stats::{CacheStats, StatsRecorder};
pub use store::CacheStore;

// == Public Constants ==
/// Default maximum key length in characters
pub const DEFAULT_MAX_KEY_SIZE: usize = 100;

/// Default maximum encoded value size in bytes
pub const DEFAULT_MAX_VAL_SIZE: usize = 500;

/// Largest TTL magnitude in seconds. Keeps `touched + expires * 1000`
/// inside a signed BIGINT.
pub const MAX_TTL_SECONDS: i64 = 1_000_000_000_000;

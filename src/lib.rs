//! dbdict - A persistent key/value cache over a relational table
//!
//! Records live in one SQL table (SQLite or MySQL), expire by age and are
//! evicted oldest-first past a size threshold. Connections come from a
//! fixed-size pool and every operation runs in its own transaction.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod pool;
pub mod tasks;

pub use api::AppState;
pub use cache::CacheStore;
pub use config::{Config, StoreOptions};
pub use error::{CacheError, Result};
pub use pool::{ConnectionPool, ScopedTransaction};
pub use tasks::spawn_cleanup_task;

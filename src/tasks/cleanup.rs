//! Sweep Task
//!
//! Background task that periodically runs the store's age and threshold
//! sweeps, so idle tables shrink even when no requests arrive.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{CacheStore, Codec};

/// Spawns a background task that sweeps `store` every `cleanup_interval_secs`.
///
/// A failed sweep is logged and retried on the next tick; the task only
/// ends when aborted.
///
/// # Example
/// ```ignore
/// let store = Arc::new(CacheStore::open(&pool, StoreOptions::new("dbdict")).await?);
/// let cleanup_handle = spawn_cleanup_task(store.clone(), 60);
/// // Later, during shutdown:
/// cleanup_handle.abort();
/// ```
pub fn spawn_cleanup_task<C: Codec>(
    store: Arc<CacheStore<C>>,
    cleanup_interval_secs: u64,
) -> JoinHandle<()> {
    let interval = Duration::from_secs(cleanup_interval_secs);

    tokio::spawn(async move {
        info!(
            table = %store.options().tablename,
            "Starting sweep task with interval of {} seconds",
            cleanup_interval_secs
        );

        loop {
            tokio::time::sleep(interval).await;

            match store.sweep().await {
                Ok(report) if !report.is_empty() => {
                    info!(
                        expired = report.expired,
                        evicted = report.evicted,
                        "Sweep removed {} records",
                        report.total()
                    );
                }
                Ok(_) => debug!("Sweep: nothing to remove"),
                Err(e) => warn!(error = %e, "Sweep failed"),
            }
        }
    })
}

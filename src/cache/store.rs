//! Cache Store Module
//!
//! Main cache engine: every operation runs in its own scoped transaction,
//! sweeps expired and over-threshold records first, then reads or writes
//! the backing table.

use std::fmt;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use sqlx::{any::AnyRow, Row};
use tracing::{debug, info, warn};

use crate::cache::{
    CacheStats, Clock, Codec, EvictionPolicy, JsonCodec, RecordMeta, StatsRecorder, SweepReport,
    SystemClock, TableSql, MAX_TTL_SECONDS,
};
use crate::config::StoreOptions;
use crate::error::{CacheError, Result};
use crate::pool::{ConnectionPool, ScopedTransaction};

fn meta_from_row(row: &AnyRow) -> Result<RecordMeta> {
    Ok(RecordMeta {
        key: row.try_get(0)?,
        expires: row.try_get(1)?,
        touched: row.try_get(2)?,
    })
}

// == Cache Store ==
/// Bounded, expiring mapping from string keys to encoded values, stored in
/// one relational table.
///
/// Nothing is cached in process: each call re-reads the table through a
/// connection leased from the pool.
pub struct CacheStore<C: Codec = JsonCodec> {
    pool: ConnectionPool,
    options: StoreOptions,
    sql: TableSql,
    policy: EvictionPolicy,
    codec: C,
    clock: Arc<dyn Clock>,
    stats: StatsRecorder,
}

impl CacheStore<JsonCodec> {
    // == Constructor ==
    /// Opens a JSON-valued store on `pool`, creating the table if needed.
    pub async fn open(pool: &ConnectionPool, options: StoreOptions) -> Result<Self> {
        Self::open_with(pool, options, JsonCodec, Arc::new(SystemClock)).await
    }
}

impl<C: Codec> CacheStore<C> {
    /// Opens a store with an explicit codec and clock.
    pub async fn open_with(
        pool: &ConnectionPool,
        options: StoreOptions,
        codec: C,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        options.validate()?;

        let store = Self {
            pool: pool.clone(),
            sql: TableSql::new(pool.dialect(), &options),
            policy: EvictionPolicy::new(options.threshold),
            options,
            codec,
            clock,
            stats: StatsRecorder::new(),
        };

        let mut tx = store.pool.begin().await?;
        let outcome = sqlx::query(&store.sql.create)
            .execute(tx.conn())
            .await
            .map(|_| ())
            .map_err(CacheError::from);
        tx.finish(outcome).await?;

        info!(table = %store.options.tablename, threshold = ?store.options.threshold, "Cache table ready");
        Ok(store)
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    // == Set ==
    /// Stores `value` under `key` with the default TTL.
    pub async fn set<V: Serialize + ?Sized>(&self, key: &str, value: &V) -> Result<()> {
        self.set_with_ttl(key, value, None).await
    }

    /// Stores `value` under `key`, overwriting any existing record.
    ///
    /// An explicit `ttl` takes precedence over `max_age_seconds`; with both
    /// absent the record never expires by age. Zero or negative TTLs store a
    /// record that is already expired; TTLs beyond [`MAX_TTL_SECONDS`] in
    /// either direction are rejected.
    pub async fn set_with_ttl<V: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &V,
        ttl: Option<i64>,
    ) -> Result<()> {
        let payload = self.codec.encode(value)?;
        self.set_bytes(key, &payload, ttl).await
    }

    /// Stores a pre-encoded payload, bypassing the codec.
    pub async fn set_bytes(&self, key: &str, payload: &[u8], ttl: Option<i64>) -> Result<()> {
        self.check_key(key)?;
        self.check_value(payload)?;
        if let Some(seconds) = ttl {
            self.check_ttl(seconds)?;
        }
        let expires = ttl.or(self.options.max_age_seconds);

        let mut tx = self.pool.begin().await?;
        let outcome = self.write(&mut tx, key, payload, expires).await;
        let report = tx.finish(outcome).await?;

        self.stats.record_write();
        self.record_sweep(report);
        debug!(key, expires = ?expires, bytes = payload.len(), "Stored record");
        Ok(())
    }

    // == Get ==
    /// Returns the value for `key`, or None if absent or expired.
    ///
    /// A hit refreshes the record's `touched` time on a best-effort basis.
    pub async fn get<V: DeserializeOwned>(&self, key: &str) -> Result<Option<V>> {
        match self.get_bytes(key).await? {
            Some(payload) => Ok(Some(self.codec.decode(&payload)?)),
            None => Ok(None),
        }
    }

    /// Returns the value for `key`, or `default` if absent or expired.
    pub async fn get_or<V: DeserializeOwned>(&self, key: &str, default: V) -> Result<V> {
        Ok(self.get(key).await?.unwrap_or(default))
    }

    /// Returns the value for `key` or [`CacheError::NotFound`].
    ///
    /// Only absence counts as missing: a stored `""`, `0` or `false` is
    /// returned like any other value.
    pub async fn get_required<V: DeserializeOwned>(&self, key: &str) -> Result<V> {
        self.get(key)
            .await?
            .ok_or_else(|| CacheError::NotFound(key.to_string()))
    }

    /// Returns the raw payload for `key`, bypassing the codec.
    pub async fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut tx = self.pool.begin().await?;
        let outcome = self.read(&mut tx, key).await;
        let (payload, report) = tx.finish(outcome).await?;

        self.record_sweep(report);
        match &payload {
            Some(_) => self.stats.record_hit(),
            None => self.stats.record_miss(),
        }
        Ok(payload)
    }

    // == Metadata ==
    /// Returns the bookkeeping columns for `key` without refreshing `touched`.
    pub async fn meta(&self, key: &str) -> Result<Option<RecordMeta>> {
        let mut tx = self.pool.begin().await?;
        let outcome = async {
            let report = self.prune(&mut tx, self.clock.now_ms(), None).await?;
            let row = sqlx::query(&self.sql.select_meta)
                .bind(key)
                .fetch_optional(tx.conn())
                .await?;
            let meta = row.as_ref().map(meta_from_row).transpose()?;
            Ok::<_, CacheError>((meta, report))
        }
        .await;
        let (meta, report) = tx.finish(outcome).await?;

        self.record_sweep(report);
        Ok(meta)
    }

    // == Expire ==
    /// Sets the TTL of an existing record, leaving its value untouched.
    ///
    /// No-op when `key` does not exist.
    pub async fn expire(&self, key: &str, seconds: i64) -> Result<()> {
        self.check_key(key)?;
        self.check_ttl(seconds)?;

        let mut tx = self.pool.begin().await?;
        let outcome = async {
            let report = self.prune(&mut tx, self.clock.now_ms(), None).await?;
            sqlx::query(&self.sql.set_expires)
                .bind(seconds)
                .bind(key)
                .execute(tx.conn())
                .await?;
            Ok::<_, CacheError>(report)
        }
        .await;
        let report = tx.finish(outcome).await?;

        self.record_sweep(report);
        debug!(key, seconds, "Updated expiry");
        Ok(())
    }

    // == Delete ==
    /// Removes the record for `key`. Returns whether a record was removed;
    /// deleting an absent key is not an error.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        self.check_key(key)?;

        let mut tx = self.pool.begin().await?;
        let outcome = async {
            let report = self.prune(&mut tx, self.clock.now_ms(), None).await?;
            let removed = sqlx::query(&self.sql.delete)
                .bind(key)
                .execute(tx.conn())
                .await?
                .rows_affected();
            Ok::<_, CacheError>((removed > 0, report))
        }
        .await;
        let (removed, report) = tx.finish(outcome).await?;

        self.record_sweep(report);
        if removed {
            self.stats.record_delete();
        }
        debug!(key, removed, "Deleted record");
        Ok(removed)
    }

    // == Length ==
    /// Returns the number of live records after sweeping.
    pub async fn len(&self) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        let outcome = async {
            let report = self.prune(&mut tx, self.clock.now_ms(), None).await?;
            let live = self.count(&mut tx).await?;
            Ok::<_, CacheError>((live, report))
        }
        .await;
        let (live, report) = tx.finish(outcome).await?;

        self.record_sweep(report);
        Ok(live)
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    // == Sweep ==
    /// Runs the age and threshold sweeps on their own.
    pub async fn sweep(&self) -> Result<SweepReport> {
        let mut tx = self.pool.begin().await?;
        let outcome = self.prune(&mut tx, self.clock.now_ms(), None).await;
        let report = tx.finish(outcome).await?;

        self.record_sweep(report);
        Ok(report)
    }

    // == Reset ==
    /// Drops and recreates the backing table, discarding every record.
    pub async fn reset(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let outcome = async {
            sqlx::query(&self.sql.drop).execute(tx.conn()).await?;
            sqlx::query(&self.sql.create).execute(tx.conn()).await?;
            Ok::<_, CacheError>(())
        }
        .await;
        tx.finish(outcome).await?;

        warn!(table = %self.options.tablename, "Cache table reset");
        Ok(())
    }

    // == Stats ==
    /// Returns the in-process operation counters.
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    // == Transaction Bodies ==

    async fn write(
        &self,
        tx: &mut ScopedTransaction,
        key: &str,
        payload: &[u8],
        expires: Option<i64>,
    ) -> Result<SweepReport> {
        let now = self.clock.now_ms();
        let mut report = self.prune(tx, now, None).await?;

        sqlx::query(&self.sql.upsert)
            .bind(key)
            .bind(payload)
            .bind(expires)
            .bind(now)
            .execute(tx.conn())
            .await?;

        // The write may have pushed the count past the threshold
        report += self.prune(tx, now, Some(key)).await?;
        Ok(report)
    }

    async fn read(
        &self,
        tx: &mut ScopedTransaction,
        key: &str,
    ) -> Result<(Option<Vec<u8>>, SweepReport)> {
        let now = self.clock.now_ms();
        let report = self.prune(tx, now, None).await?;

        let row = sqlx::query(&self.sql.select_val)
            .bind(key)
            .fetch_optional(tx.conn())
            .await?;
        let Some(row) = row else {
            return Ok((None, report));
        };
        let payload: Option<Vec<u8>> = row.try_get(0)?;

        // Bookkeeping must never fail the read
        if let Err(e) = sqlx::query(&self.sql.touch)
            .bind(now)
            .bind(key)
            .execute(tx.conn())
            .await
        {
            warn!(key, error = %e, "Failed to refresh touched time");
        }

        Ok((Some(payload.unwrap_or_default()), report))
    }

    async fn prune(
        &self,
        tx: &mut ScopedTransaction,
        now: i64,
        protect: Option<&str>,
    ) -> Result<SweepReport> {
        let expired = sqlx::query(&self.sql.sweep_expired)
            .bind(now)
            .execute(tx.conn())
            .await?
            .rows_affected();

        let evicted = self.enforce_threshold(tx, protect).await?;
        Ok(SweepReport { expired, evicted })
    }

    async fn enforce_threshold(
        &self,
        tx: &mut ScopedTransaction,
        protect: Option<&str>,
    ) -> Result<u64> {
        if self.policy.threshold().is_none() {
            return Ok(0);
        }

        let excess = self.policy.excess(self.count(tx).await?);
        if excess == 0 {
            return Ok(0);
        }

        // One spare row in case the protected key is among the oldest
        let rows = sqlx::query(&self.sql.oldest)
            .bind(excess as i64 + 1)
            .fetch_all(tx.conn())
            .await?;
        let candidates = rows.iter().map(meta_from_row).collect::<Result<Vec<_>>>()?;

        let victims = self.policy.select_overflow(&candidates, excess, protect);
        for key in &victims {
            sqlx::query(&self.sql.delete)
                .bind(key.as_str())
                .execute(tx.conn())
                .await?;
        }

        debug!(evicted = victims.len(), "Threshold sweep");
        Ok(victims.len() as u64)
    }

    async fn count(&self, tx: &mut ScopedTransaction) -> Result<usize> {
        let row = sqlx::query(&self.sql.count).fetch_one(tx.conn()).await?;
        let live: i64 = row.try_get(0)?;
        Ok(live.max(0) as usize)
    }

    // == Validation ==

    fn check_key(&self, key: &str) -> Result<()> {
        let len = key.chars().count();
        if len > self.options.max_key_size {
            return Err(CacheError::Constraint(format!(
                "Key length {} exceeds maximum of {}",
                len, self.options.max_key_size
            )));
        }
        Ok(())
    }

    fn check_value(&self, payload: &[u8]) -> Result<()> {
        if payload.len() > self.options.max_val_size {
            return Err(CacheError::Constraint(format!(
                "Value size {} bytes exceeds maximum of {}",
                payload.len(),
                self.options.max_val_size
            )));
        }
        Ok(())
    }

    fn check_ttl(&self, seconds: i64) -> Result<()> {
        if !(-MAX_TTL_SECONDS..=MAX_TTL_SECONDS).contains(&seconds) {
            return Err(CacheError::Constraint(format!(
                "TTL {} seconds is outside ±{}",
                seconds, MAX_TTL_SECONDS
            )));
        }
        Ok(())
    }

    fn record_sweep(&self, report: SweepReport) {
        if !report.is_empty() {
            debug!(expired = report.expired, evicted = report.evicted, "Swept records");
        }
        self.stats.record_sweep(report);
    }
}

impl<C: Codec> fmt::Debug for CacheStore<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStore")
            .field("options", &self.options)
            .field("pool", &self.pool)
            .finish()
    }
}

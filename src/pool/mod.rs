//! Connection Pool Module
//!
//! Fixed-capacity pool of backend connections. Every lease is reset to a
//! clean session before it is handed out, and returned to the free list
//! when dropped.

mod dialect;
mod transaction;

pub use dialect::Dialect;
pub use transaction::ScopedTransaction;

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once};

use parking_lot::Mutex;
use sqlx::{AnyConnection, Connection, Executor};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use crate::error::{CacheError, Result};

// The `Any` driver resolves backends at runtime
static INSTALL_DRIVERS: Once = Once::new();

fn install_drivers() {
    INSTALL_DRIVERS.call_once(|| {
        sqlx::any::install_default_drivers();
    });
}

// == Pool Status ==
/// Point-in-time view of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub capacity: usize,
    pub idle: usize,
    pub leased: usize,
}

/// What the previous borrower may have left on a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    /// Last used by a transaction that committed or rolled back
    Clean,
    /// A scoped transaction was dropped while still open
    InTransaction,
    /// Handed out by `acquire()`; anything may have run on it
    Raw,
}

struct IdleConnection {
    conn: AnyConnection,
    state: SessionState,
}

struct PoolInner {
    url: String,
    dialect: Dialect,
    capacity: usize,
    idle: Mutex<Vec<IdleConnection>>,
    permits: Arc<Semaphore>,
    closed: AtomicBool,
}

impl PoolInner {
    async fn open(&self) -> Result<AnyConnection> {
        let mut conn = AnyConnection::connect(&self.url).await?;
        for stmt in self.dialect.setup_statements() {
            conn.execute(*stmt).await?;
        }
        debug!(dialect = ?self.dialect, "Opened new pooled connection");
        Ok(conn)
    }

    async fn reset(&self, mut conn: AnyConnection, dirty: bool) -> Result<AnyConnection> {
        for stmt in self.dialect.reset_statements(dirty) {
            if let Err(e) = conn.execute(*stmt).await {
                let _ = conn.close().await;
                return Err(e.into());
            }
        }
        Ok(conn)
    }

    async fn recycle(&self, conn: AnyConnection, state: SessionState) -> Result<AnyConnection> {
        match state {
            // Temp tables, locks and session variables only die with the session
            SessionState::Raw => {
                if let Err(e) = conn.close().await {
                    debug!(error = %e, "Error closing raw session");
                }
                self.open().await
            }
            SessionState::InTransaction | SessionState::Clean => {
                let dirty = state == SessionState::InTransaction;
                match self.reset(conn, dirty).await {
                    Ok(conn) => Ok(conn),
                    Err(e) => {
                        warn!(error = %e, "Connection reset failed, opening a fresh session");
                        self.open().await
                    }
                }
            }
        }
    }

    fn give_back(&self, conn: AnyConnection, state: SessionState) {
        if self.closed.load(Ordering::Acquire) {
            debug!("Discarding connection released after pool close");
            return;
        }
        self.idle.lock().push(IdleConnection { conn, state });
    }
}

// == Connection Pool ==
/// Fixed-size set of reusable connections.
///
/// Cloning is cheap and yields another handle to the same pool.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    // == Constructor ==
    /// Creates a pool of at most `capacity` connections to `url`.
    ///
    /// One connection is opened eagerly so misconfiguration fails here and
    /// not on the first cache operation. The rest are opened on demand.
    pub async fn connect(url: &str, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(CacheError::Config(
                "Pool capacity must be at least 1".to_string(),
            ));
        }
        install_drivers();

        let dialect = Dialect::from_url(url)?;
        let inner = Arc::new(PoolInner {
            url: url.to_string(),
            dialect,
            capacity,
            idle: Mutex::new(Vec::with_capacity(capacity)),
            permits: Arc::new(Semaphore::new(capacity)),
            closed: AtomicBool::new(false),
        });

        let first = inner.open().await?;
        inner.give_back(first, SessionState::Clean);

        info!(?dialect, capacity, "Connection pool ready");
        Ok(Self { inner })
    }

    // == Acquire ==
    /// Leases a connection, waiting while all `capacity` connections are out.
    ///
    /// The lease is reset before it is returned. A session that was leased
    /// here and never ran a [`ScopedTransaction`] to completion is replaced
    /// by a fresh one, since arbitrary statements may have run on it. Fails
    /// with [`CacheError::Config`] once the pool has been closed.
    pub async fn acquire(&self) -> Result<PooledConnection> {
        let permit = self
            .inner
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| CacheError::Config("Connection pool is closed".to_string()))?;

        let mut lease = PooledConnection {
            conn: None,
            state: SessionState::Raw,
            pool: Arc::clone(&self.inner),
            _permit: permit,
        };

        let idle = self.inner.idle.lock().pop();
        let conn = match idle {
            Some(IdleConnection { conn, state }) => self.inner.recycle(conn, state).await?,
            None => self.inner.open().await?,
        };

        lease.conn = Some(conn);
        Ok(lease)
    }

    // == Release ==
    /// Returns a lease to the pool. Dropping the lease has the same effect.
    pub fn release(&self, lease: PooledConnection) {
        drop(lease);
    }

    // == Begin ==
    /// Leases a connection and opens a transaction on it.
    pub async fn begin(&self) -> Result<ScopedTransaction> {
        ScopedTransaction::begin(self).await
    }

    // == Close ==
    /// Drains and closes idle connections. Leases still out are discarded
    /// when released, and every later `acquire()` fails.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.permits.close();

        let drained = std::mem::take(&mut *self.inner.idle.lock());
        let count = drained.len();
        for idle in drained {
            if let Err(e) = idle.conn.close().await {
                debug!(error = %e, "Error closing pooled connection");
            }
        }

        info!(closed_connections = count, "Connection pool closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn dialect(&self) -> Dialect {
        self.inner.dialect
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    // == Status ==
    pub fn status(&self) -> PoolStatus {
        let available = if self.is_closed() {
            self.inner.capacity
        } else {
            self.inner.permits.available_permits()
        };
        PoolStatus {
            capacity: self.inner.capacity,
            idle: self.inner.idle.lock().len(),
            leased: self.inner.capacity.saturating_sub(available),
        }
    }
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // URL omitted: it carries credentials
        f.debug_struct("ConnectionPool")
            .field("dialect", &self.inner.dialect)
            .field("capacity", &self.inner.capacity)
            .field("closed", &self.is_closed())
            .finish()
    }
}

// == Pooled Connection ==
/// One leased connection. Owned by a single operation at a time.
pub struct PooledConnection {
    conn: Option<AnyConnection>,
    state: SessionState,
    pool: Arc<PoolInner>,
    // Dropped after `Drop::drop` puts the connection back
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    pub fn dialect(&self) -> Dialect {
        self.pool.dialect
    }

    /// Flags the session as possibly inside an open transaction.
    pub(crate) fn mark_in_transaction(&mut self) {
        self.state = SessionState::InTransaction;
    }

    /// Flags the session as having ended its transaction cleanly.
    pub(crate) fn mark_clean(&mut self) {
        self.state = SessionState::Clean;
    }
}

impl Deref for PooledConnection {
    type Target = AnyConnection;

    fn deref(&self) -> &AnyConnection {
        self.conn
            .as_ref()
            .unwrap_or_else(|| unreachable!("lease holds a connection until dropped"))
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut AnyConnection {
        self.conn
            .as_mut()
            .unwrap_or_else(|| unreachable!("lease holds a connection until dropped"))
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.give_back(conn, self.state);
        }
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("dialect", &self.pool.dialect)
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn sqlite_url(dir: &TempDir) -> String {
        format!("sqlite://{}?mode=rwc", dir.path().join("pool.db").display())
    }

    #[tokio::test]
    async fn test_pool_rejects_zero_capacity() {
        let dir = TempDir::new().unwrap();
        let result = ConnectionPool::connect(&sqlite_url(&dir), 0).await;
        assert!(matches!(result, Err(CacheError::Config(_))));
    }

    #[tokio::test]
    async fn test_pool_reuses_released_connection() {
        let dir = TempDir::new().unwrap();
        let pool = ConnectionPool::connect(&sqlite_url(&dir), 2).await.unwrap();
        assert_eq!(pool.status().idle, 1);

        let lease = pool.acquire().await.unwrap();
        assert_eq!(pool.status().leased, 1);
        assert_eq!(pool.status().idle, 0);

        pool.release(lease);
        let status = pool.status();
        assert_eq!(status.leased, 0);
        assert_eq!(status.idle, 1);
    }

    #[tokio::test]
    async fn test_acquire_waits_when_exhausted() {
        let dir = TempDir::new().unwrap();
        let pool = ConnectionPool::connect(&sqlite_url(&dir), 1).await.unwrap();

        let held = pool.acquire().await.unwrap();

        let blocked = tokio::time::timeout(Duration::from_millis(100), pool.acquire()).await;
        assert!(blocked.is_err(), "second acquire should wait for a release");

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire().await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(held);

        let joined = tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .expect("waiter should complete after release")
            .unwrap();
        assert!(joined.is_ok());
    }

    #[tokio::test]
    async fn test_closed_pool_rejects_acquire() {
        let dir = TempDir::new().unwrap();
        let pool = ConnectionPool::connect(&sqlite_url(&dir), 2).await.unwrap();

        pool.close().await;
        assert!(pool.is_closed());
        assert_eq!(pool.status().idle, 0);

        let result = pool.acquire().await;
        assert!(matches!(result, Err(CacheError::Config(_))));
    }

    #[tokio::test]
    async fn test_close_wakes_queued_acquire() {
        let dir = TempDir::new().unwrap();
        let pool = ConnectionPool::connect(&sqlite_url(&dir), 1).await.unwrap();
        let held = pool.acquire().await.unwrap();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire().await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        pool.close().await;

        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(CacheError::Config(_))));

        // Released after close: discarded, not pooled
        drop(held);
        assert_eq!(pool.status().idle, 0);
    }

    #[tokio::test]
    async fn test_abandoned_transaction_is_rolled_back_on_reuse() {
        let dir = TempDir::new().unwrap();
        let pool = ConnectionPool::connect(&sqlite_url(&dir), 1).await.unwrap();
        {
            let mut lease = pool.acquire().await.unwrap();
            lease.execute("CREATE TABLE t (x INTEGER)").await.unwrap();
        }

        {
            let mut tx = pool.begin().await.unwrap();
            tx.conn().execute("INSERT INTO t (x) VALUES (1)").await.unwrap();
            // dropped without COMMIT
        }

        // Would fail with "cannot start a transaction within a transaction"
        let mut tx = pool.begin().await.unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM t")
            .fetch_one(tx.conn())
            .await
            .unwrap();
        assert_eq!(count, 0);
        tx.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn test_raw_lease_session_is_replaced() {
        let dir = TempDir::new().unwrap();
        let pool = ConnectionPool::connect(&sqlite_url(&dir), 1).await.unwrap();

        {
            let mut lease = pool.acquire().await.unwrap();
            lease.execute("BEGIN").await.unwrap();
            lease.execute("CREATE TEMP TABLE scratch (x INTEGER)").await.unwrap();
            // dropped inside the transaction, temp table still present
        }

        let mut tx = pool.begin().await.unwrap();
        let scratch = sqlx::query("SELECT COUNT(*) FROM scratch")
            .fetch_one(tx.conn())
            .await;
        assert!(scratch.is_err(), "temp table leaked into the next lease");
        tx.rollback().await.unwrap();

        // Outside any transaction the temp table would outlive a ROLLBACK
        {
            let mut lease = pool.acquire().await.unwrap();
            lease.execute("CREATE TEMP TABLE scratch (x INTEGER)").await.unwrap();
        }
        let mut lease = pool.acquire().await.unwrap();
        assert!(lease.execute("SELECT COUNT(*) FROM scratch").await.is_err());
        assert_eq!(pool.status().idle, 0);
    }
}

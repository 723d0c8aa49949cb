//! Scoped Transaction Module
//!
//! A unit of work bound to one leased connection: commit on success,
//! rollback on failure, release in every case.

use sqlx::{AnyConnection, Executor};
use tracing::{debug, warn};

use super::{ConnectionPool, PooledConnection};
use crate::error::{CacheError, Result};

// == Scoped Transaction ==
/// An open transaction on a leased connection.
///
/// Finish it with [`finish`](Self::finish), [`commit`](Self::commit) or
/// [`rollback`](Self::rollback). The lease goes back to the pool when the
/// transaction is consumed or dropped; a transaction dropped while still
/// open leaves its connection flagged so the next borrower's reset rolls
/// it back.
#[derive(Debug)]
pub struct ScopedTransaction {
    lease: PooledConnection,
}

impl ScopedTransaction {
    // == Begin ==
    /// Acquires a connection from `pool` and opens a transaction on it.
    pub async fn begin(pool: &ConnectionPool) -> Result<Self> {
        let mut lease = pool.acquire().await?;
        let begin = lease.dialect().begin_statement();

        lease.mark_in_transaction();
        lease.execute(begin).await?;

        Ok(Self { lease })
    }

    /// Connection to run statements against.
    pub fn conn(&mut self) -> &mut AnyConnection {
        &mut self.lease
    }

    // == Commit ==
    /// Commits the transaction.
    ///
    /// A failing COMMIT is reported as [`CacheError::CommitFailed`]; the
    /// connection is still released.
    pub async fn commit(mut self) -> Result<()> {
        match self.lease.execute("COMMIT").await {
            Ok(_) => {
                self.lease.mark_clean();
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Commit failed, transaction state uncertain");
                Err(CacheError::CommitFailed(e))
            }
        }
    }

    // == Rollback ==
    /// Rolls the transaction back. The connection is released either way.
    pub async fn rollback(mut self) -> std::result::Result<(), sqlx::Error> {
        self.lease.execute("ROLLBACK").await?;
        self.lease.mark_clean();
        Ok(())
    }

    // == Finish ==
    /// Commits when `outcome` is `Ok`, rolls back when it is `Err`.
    ///
    /// On rollback the original error is returned, or
    /// [`CacheError::RollbackFailed`] wrapping it if the rollback itself
    /// failed.
    pub async fn finish<T>(self, outcome: Result<T>) -> Result<T> {
        match outcome {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(cause) => {
                debug!(error = %cause, "Rolling back transaction");
                match self.rollback().await {
                    Ok(()) => Err(cause),
                    Err(source) => {
                        warn!(error = %source, cause = %cause, "Rollback failed");
                        Err(CacheError::RollbackFailed {
                            cause: Box::new(cause),
                            source,
                        })
                    }
                }
            }
        }
    }
}

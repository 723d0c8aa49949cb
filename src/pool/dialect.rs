//! SQL Dialect Module
//!
//! Per-engine control statements used by the pool and the scoped transaction.

use crate::error::{CacheError, Result};

// == Dialect ==
/// Relational engine behind a connection URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Embedded SQLite database (local runs and tests)
    Sqlite,
    /// Networked MySQL / MariaDB server
    MySql,
}

impl Dialect {
    // == From URL ==
    /// Picks the dialect from a connection URL scheme.
    pub fn from_url(url: &str) -> Result<Self> {
        let scheme = url.split(':').next().unwrap_or_default();
        match scheme {
            "sqlite" => Ok(Dialect::Sqlite),
            "mysql" | "mariadb" => Ok(Dialect::MySql),
            other => Err(CacheError::Config(format!(
                "Unsupported database scheme '{}'",
                other
            ))),
        }
    }

    // == Begin ==
    /// Statement opening an explicit transaction.
    ///
    /// SQLite takes the write lock up front so concurrent writers wait on the
    /// busy timeout rather than failing on lock upgrade.
    pub fn begin_statement(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "BEGIN IMMEDIATE",
            Dialect::MySql => "START TRANSACTION",
        }
    }

    // == Session Reset ==
    /// Statements that return a leased connection to a clean session.
    ///
    /// `dirty` is set when the previous borrower left a transaction open.
    pub fn reset_statements(&self, dirty: bool) -> &'static [&'static str] {
        match (self, dirty) {
            (Dialect::Sqlite, false) => &[],
            (Dialect::Sqlite, true) => &["ROLLBACK"],
            (Dialect::MySql, _) => &["ROLLBACK", "UNLOCK TABLES", "SET autocommit = 0"],
        }
    }

    // == Session Setup ==
    /// Statements run once on every freshly opened connection.
    pub fn setup_statements(&self) -> &'static [&'static str] {
        match self {
            // SQLite has no autocommit switch; every unit of work runs
            // inside an explicit BEGIN instead
            Dialect::Sqlite => &[],
            Dialect::MySql => &["SET autocommit = 0"],
        }
    }
}

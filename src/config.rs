//! Configuration Module
//!
//! Server configuration loaded from environment variables, and the
//! constructor-time options of a cache store.

use std::env;

use crate::cache::{DEFAULT_MAX_KEY_SIZE, DEFAULT_MAX_VAL_SIZE, MAX_TTL_SECONDS};
use crate::error::{CacheError, Result};

/// Longest table name accepted (MySQL identifier limit).
const MAX_TABLE_NAME_LENGTH: usize = 64;

// == Store Options ==
/// Options fixed when a [`CacheStore`](crate::cache::CacheStore) is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    /// Backing table name
    pub tablename: String,
    /// Maximum live record count before oldest-first eviction. Must be
    /// positive; None = unbounded
    pub threshold: Option<usize>,
    /// TTL applied when `set` supplies none
    pub max_age_seconds: Option<i64>,
    /// Maximum key length in characters
    pub max_key_size: usize,
    /// Maximum encoded value length in bytes
    pub max_val_size: usize,
}

impl StoreOptions {
    /// Options for `tablename` with no threshold, no default TTL and the
    /// default column bounds.
    pub fn new(tablename: impl Into<String>) -> Self {
        Self {
            tablename: tablename.into(),
            threshold: None,
            max_age_seconds: None,
            max_key_size: DEFAULT_MAX_KEY_SIZE,
            max_val_size: DEFAULT_MAX_VAL_SIZE,
        }
    }

    pub fn threshold(mut self, threshold: usize) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn max_age_seconds(mut self, seconds: i64) -> Self {
        self.max_age_seconds = Some(seconds);
        self
    }

    pub fn max_key_size(mut self, size: usize) -> Self {
        self.max_key_size = size;
        self
    }

    pub fn max_val_size(mut self, size: usize) -> Self {
        self.max_val_size = size;
        self
    }

    // == Validate ==
    /// Checks the options before they reach any SQL.
    ///
    /// The table name is interpolated into statements, so only plain
    /// identifiers are accepted.
    pub fn validate(&self) -> Result<()> {
        let name = self.tablename.as_str();
        let mut chars = name.chars();
        let starts_ok = chars
            .next()
            .map(|c| c.is_ascii_alphabetic() || c == '_')
            .unwrap_or(false);
        let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !starts_ok || !rest_ok || name.len() > MAX_TABLE_NAME_LENGTH {
            return Err(CacheError::Config(format!(
                "Invalid table name '{}'",
                name
            )));
        }

        if self.max_key_size == 0 || self.max_val_size == 0 {
            return Err(CacheError::Config(
                "Column size bounds must be positive".to_string(),
            ));
        }

        // A zero threshold would evict every record it is asked to keep
        if self.threshold == Some(0) {
            return Err(CacheError::Config(
                "Threshold must be positive, leave it unset for no limit".to_string(),
            ));
        }

        if let Some(age) = self.max_age_seconds {
            if !(-MAX_TTL_SECONDS..=MAX_TTL_SECONDS).contains(&age) {
                return Err(CacheError::Config(format!(
                    "Default TTL {} is out of range",
                    age
                )));
            }
        }

        Ok(())
    }
}

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Backend connection URL (`sqlite:` or `mysql:`)
    pub database_url: String,
    /// Number of pooled connections
    pub pool_size: usize,
    /// Backing table name
    pub table_name: String,
    /// Maximum live records, None = unbounded
    pub threshold: Option<usize>,
    /// Default TTL in seconds, None = no expiry
    pub max_age_seconds: Option<i64>,
    /// Maximum key length
    pub max_key_size: usize,
    /// Maximum encoded value size
    pub max_val_size: usize,
    /// HTTP server port
    pub server_port: u16,
    /// Background sweep interval in seconds, 0 = disabled
    pub cleanup_interval: u64,
}

fn parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `DATABASE_URL` - Backend URL (default: `sqlite://dbdict.db?mode=rwc`)
    /// - `POOL_SIZE` - Pooled connections (default: 5)
    /// - `TABLE_NAME` - Backing table (default: `dbdict`)
    /// - `THRESHOLD` - Maximum live records (default: unbounded, 0 also means unbounded)
    /// - `MAX_AGE_SECONDS` - Default TTL (default: none)
    /// - `MAX_KEY_SIZE` - Key bound (default: 100)
    /// - `MAX_VAL_SIZE` - Value bound (default: 500)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `CLEANUP_INTERVAL` - Sweep frequency in seconds (default: 60)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            pool_size: parsed("POOL_SIZE").unwrap_or(defaults.pool_size),
            table_name: env::var("TABLE_NAME").unwrap_or(defaults.table_name),
            threshold: parsed("THRESHOLD").filter(|&n: &usize| n > 0),
            max_age_seconds: parsed("MAX_AGE_SECONDS"),
            max_key_size: parsed("MAX_KEY_SIZE").unwrap_or(defaults.max_key_size),
            max_val_size: parsed("MAX_VAL_SIZE").unwrap_or(defaults.max_val_size),
            server_port: parsed("SERVER_PORT").unwrap_or(defaults.server_port),
            cleanup_interval: parsed("CLEANUP_INTERVAL").unwrap_or(defaults.cleanup_interval),
        }
    }

    // == Store Options ==
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            tablename: self.table_name.clone(),
            threshold: self.threshold,
            max_age_seconds: self.max_age_seconds,
            max_key_size: self.max_key_size,
            max_val_size: self.max_val_size,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://dbdict.db?mode=rwc".to_string(),
            pool_size: 5,
            table_name: "dbdict".to_string(),
            threshold: None,
            max_age_seconds: None,
            max_key_size: DEFAULT_MAX_KEY_SIZE,
            max_val_size: DEFAULT_MAX_VAL_SIZE,
            server_port: 3000,
            cleanup_interval: 60,
        }
    }
}

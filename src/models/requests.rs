//! Request DTOs for the cache server API
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::Deserialize;
use serde_json::Value;

use crate::cache::MAX_TTL_SECONDS;

fn check_key(key: &str) -> Option<String> {
    if key.is_empty() {
        return Some("Key cannot be empty".to_string());
    }
    None
}

fn check_ttl(seconds: i64) -> Option<String> {
    if !(-MAX_TTL_SECONDS..=MAX_TTL_SECONDS).contains(&seconds) {
        return Some(format!("TTL must be within ±{} seconds", MAX_TTL_SECONDS));
    }
    None
}

/// Request body for the SET operation (PUT /set)
///
/// # Fields
/// - `key`: The cache key to store the value under
/// - `value`: Any JSON value; stored in its JSON encoding
/// - `ttl`: Optional TTL in seconds (store default if not specified)
#[derive(Debug, Clone, Deserialize)]
pub struct SetRequest {
    /// The cache key
    pub key: String,
    /// The value to store
    pub value: Value,
    /// Optional TTL in seconds
    #[serde(default)]
    pub ttl: Option<i64>,
}

impl SetRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid. Size
    /// bounds are enforced by the store itself.
    pub fn validate(&self) -> Option<String> {
        check_key(&self.key).or_else(|| self.ttl.and_then(check_ttl))
    }
}

/// Request body for the EXPIRE operation (POST /expire)
#[derive(Debug, Clone, Deserialize)]
pub struct ExpireRequest {
    pub key: String,
    /// New TTL in seconds, measured from the record's last touch
    pub seconds: i64,
}

impl ExpireRequest {
    pub fn validate(&self) -> Option<String> {
        check_key(&self.key).or_else(|| check_ttl(self.seconds))
    }
}

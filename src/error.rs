//! Error types for the cache
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// == Cache Error Enum ==
/// Unified error type for the pool, the store and the HTTP facade.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key not found (strict accessor only)
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Key or encoded value exceeds the configured column bounds
    #[error("Constraint violated: {0}")]
    Constraint(String),

    /// Any failure talking to the backing store
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// COMMIT itself failed; whether the transaction applied is unknown
    #[error("Commit failed, transaction state uncertain: {0}")]
    CommitFailed(#[source] sqlx::Error),

    /// ROLLBACK failed while unwinding an earlier failure
    #[error("Rollback failed after error ({cause}): {source}")]
    RollbackFailed {
        cause: Box<CacheError>,
        #[source]
        source: sqlx::Error,
    },

    /// Invalid configuration or use of a closed pool
    #[error("Configuration error: {0}")]
    Config(String),

    /// Value could not be encoded or decoded
    #[error("Codec error: {0}")]
    Codec(String),

    /// Malformed HTTP request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl CacheError {
    /// Returns true for errors raised by size validation.
    pub fn is_constraint(&self) -> bool {
        matches!(self, CacheError::Constraint(_))
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::Constraint(_) => StatusCode::PAYLOAD_TOO_LARGE,
            CacheError::Codec(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CacheError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            CacheError::Config(_) => StatusCode::SERVICE_UNAVAILABLE,
            CacheError::Storage(_)
            | CacheError::CommitFailed(_)
            | CacheError::RollbackFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(ErrorResponse::new(self.to_string()));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;

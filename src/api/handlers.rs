//! API Handlers
//!
//! HTTP request handlers for each cache server endpoint. Values are
//! arbitrary JSON, stored through the store's JSON codec.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::Value;

use crate::cache::CacheStore;
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::models::{
    DeleteResponse, ExpireRequest, ExpireResponse, GetResponse, HealthResponse, SetRequest,
    SetResponse, StatsResponse,
};
use crate::pool::ConnectionPool;

/// Application state shared across all handlers.
///
/// The store needs no lock: every operation leases its own connection.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<CacheStore>,
}

impl AppState {
    /// Creates a new AppState with the given cache store.
    pub fn new(cache: CacheStore) -> Self {
        Self {
            cache: Arc::new(cache),
        }
    }

    /// Connects the pool and opens the store described by `config`.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let pool = ConnectionPool::connect(&config.database_url, config.pool_size).await?;
        let cache = CacheStore::open(&pool, config.store_options()).await?;
        Ok(Self::new(cache))
    }
}

/// Handler for PUT /set
///
/// Stores a key-value pair with optional TTL, overwriting any existing value.
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    state.cache.set_with_ttl(&req.key, &req.value, req.ttl).await?;

    Ok(Json(SetResponse::new(req.key)))
}

/// Handler for GET /get/:key
///
/// Retrieves a value by key; absent or expired keys are 404.
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<GetResponse>> {
    let value: Value = state.cache.get_required(&key).await?;

    Ok(Json(GetResponse::new(key, value)))
}

/// Handler for DELETE /del/:key
///
/// Deleting an absent key succeeds with `removed: false`.
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<DeleteResponse>> {
    let removed = state.cache.delete(&key).await?;

    Ok(Json(DeleteResponse::new(key, removed)))
}

/// Handler for POST /expire
///
/// Replaces the TTL of an existing record; a missing key is a no-op.
pub async fn expire_handler(
    State(state): State<AppState>,
    Json(req): Json<ExpireRequest>,
) -> Result<Json<ExpireResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    state.cache.expire(&req.key, req.seconds).await?;

    Ok(Json(ExpireResponse::new(req.key, req.seconds)))
}

/// Handler for GET /stats
///
/// Returns operation counters, the live record count and pool occupancy.
pub async fn stats_handler(State(state): State<AppState>) -> Result<Json<StatsResponse>> {
    let total_entries = state.cache.len().await?;
    let stats = state.cache.stats();

    Ok(Json(StatsResponse::new(
        &stats,
        total_entries,
        state.cache.pool().status(),
    )))
}

/// Handler for GET /health
pub async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    if state.cache.pool().is_closed() {
        (StatusCode::SERVICE_UNAVAILABLE, Json(HealthResponse::unavailable()))
    } else {
        (StatusCode::OK, Json(HealthResponse::healthy()))
    }
}

//! System API endpoints.
//!
//! Liveness, marketplace status and cache administration.

use axum::{
    Json,
    extract::{Query, State},
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use super::{ApiError, ApiResponse, AppState, CachePurgeDto, CachePurgeParams, HealthDto};
use crate::domain::Platform;
use crate::services::PlatformStats;

/// Liveness probe.
///
/// # Endpoint
/// `GET /api/health`
pub async fn health(State(state): State<Arc<AppState>>) -> Json<ApiResponse<HealthDto>> {
    Json(ApiResponse::success(HealthDto {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        cache_backend: state.cache().backend(),
        platforms: state.keywords().registered_platforms(),
    }))
}

/// Probes every registered marketplace with a one-result search.
///
/// # Endpoint
/// `GET /api/health/platforms`
pub async fn platform_health(
    State(state): State<Arc<AppState>>,
) -> Json<ApiResponse<BTreeMap<Platform, bool>>> {
    let health = state.keywords().health_check().await;
    let healthy = health.values().filter(|ok| **ok).count();
    let meta = serde_json::json!({ "healthy": healthy, "total": health.len() });
    Json(ApiResponse::success(health).with_meta(meta))
}

/// # Endpoint
/// `GET /api/platforms`
pub async fn list_platforms(
    State(state): State<Arc<AppState>>,
) -> Json<ApiResponse<BTreeMap<Platform, PlatformStats>>> {
    Json(ApiResponse::success(state.keywords().platform_stats().await))
}

/// Deletes cache entries matching a glob pattern.
///
/// # Endpoint
/// `DELETE /api/cache?pattern=search:*`
pub async fn purge_cache(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CachePurgeParams>,
) -> Result<Json<ApiResponse<CachePurgeDto>>, ApiError> {
    let pattern = params
        .pattern
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::validation("pattern is required"))?;

    let deleted = state.cache().delete_by_pattern(&pattern).await;
    info!(pattern = %pattern, deleted, "Cache entries purged");

    Ok(Json(ApiResponse::success(CachePurgeDto { pattern, deleted })))
}

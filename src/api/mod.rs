use axum::{
    Router,
    http::{HeaderValue, Uri},
    middleware,
    routing::{delete, get, post},
};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::cache::CacheService;
use crate::config::Config;
use crate::services::{FavoriteStore, KeywordService, SearchHistory};
use crate::state::SharedState;

mod catalog;
mod error;
pub mod keywords;
mod observability;
mod system;
mod types;
mod validation;

pub use error::ApiError;
pub use types::*;

use metrics_exporter_prometheus::PrometheusHandle;

#[derive(Clone)]
pub struct AppState {
    pub shared: Arc<SharedState>,

    pub start_time: std::time::Instant,

    pub prometheus_handle: Option<PrometheusHandle>,
}

impl AppState {
    #[must_use]
    pub fn config(&self) -> &Arc<RwLock<Config>> {
        &self.shared.config
    }

    #[must_use]
    pub fn keywords(&self) -> &Arc<dyn KeywordService> {
        &self.shared.keywords
    }

    #[must_use]
    pub fn history(&self) -> &Arc<SearchHistory> {
        &self.shared.history
    }

    #[must_use]
    pub fn favorites(&self) -> &Arc<FavoriteStore> {
        &self.shared.favorites
    }

    #[must_use]
    pub fn cache(&self) -> &CacheService {
        &self.shared.cache
    }
}

#[must_use]
pub fn create_app_state(
    shared: Arc<SharedState>,
    prometheus_handle: Option<PrometheusHandle>,
) -> Arc<AppState> {
    Arc::new(AppState {
        shared,
        start_time: std::time::Instant::now(),
        prometheus_handle,
    })
}

pub async fn create_app_state_from_config(
    config: Config,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    let shared = Arc::new(SharedState::new(config).await?);
    Ok(create_app_state(shared, prometheus_handle))
}

pub async fn router(state: Arc<AppState>) -> Router {
    let cors_origins = state.config().read().await.server.cors_allowed_origins.clone();

    let api_router = Router::new()
        .route("/keywords/search", get(keywords::search_keywords))
        .route("/keywords/related", get(keywords::related_keywords))
        .route("/keywords/trending", get(keywords::trending_keywords))
        .route("/keywords/history", get(keywords::search_history))
        .route("/keywords/bulk-analyze", post(keywords::bulk_analyze))
        .route(
            "/keywords/favorites",
            get(keywords::list_favorites).post(keywords::add_favorite),
        )
        .route("/keywords/favorites/{id}", delete(keywords::remove_favorite))
        .route("/platforms", get(system::list_platforms))
        .route(
            "/platforms/{platform}/categories",
            get(catalog::list_categories),
        )
        .route(
            "/platforms/{platform}/items/{id}",
            get(catalog::item_details),
        )
        .route(
            "/platforms/{platform}/groups/{id}/listings",
            get(catalog::group_listings),
        )
        .route("/health", get(system::health))
        .route("/health/platforms", get(system::platform_health))
        .route("/cache", delete(system::purge_cache))
        .fallback(not_found);

    let cors_layer = if cors_origins.contains(&"*".to_string()) {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> =
            cors_origins.iter().filter_map(|s| s.parse().ok()).collect();
        CorsLayer::new().allow_origin(origins)
    };

    Router::new()
        .nest("/api", api_router)
        .route("/metrics", get(observability::get_metrics))
        .with_state(state)
        .layer(cors_layer.allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(observability::track_metrics))
}

async fn not_found(uri: Uri) -> ApiError {
    ApiError::not_found("Route", uri.path())
}

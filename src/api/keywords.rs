use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
};
use std::sync::Arc;
use tracing::info;

use super::validation::{
    parse_platforms, parse_required_platform, parse_single_platform, validate_keyword,
    validate_limit,
};
use super::{
    ApiError, ApiResponse, AppState, BulkAnalyzeRequest, FavoriteRequest, PageParams,
    RelatedParams, SearchParams, TrendingParams,
};
use crate::models::{AggregatedSearchResult, BulkAnalysis, KeywordRecord, SearchOptions};
use crate::services::{Favorite, FavoritesPage, HistoryPage};

pub const USER_ID_HEADER: &str = "x-user-id";

const MAX_LIMIT: usize = 100;
const DEFAULT_HISTORY_LIMIT: usize = 20;
const DEFAULT_BULK_LIMIT: usize = 10;

pub(crate) fn user_id(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

pub async fn search_keywords(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<SearchParams>,
) -> Result<Json<ApiResponse<AggregatedSearchResult>>, ApiError> {
    let keyword = validate_keyword(params.keyword.as_deref())?;
    let selection = parse_platforms(params.platform.as_deref(), params.platforms.as_deref())?;

    let default_limit = state.config().read().await.search.default_max_results;
    let limit = validate_limit(params.limit.unwrap_or(default_limit), MAX_LIMIT)?;

    let options = SearchOptions {
        platforms: selection,
        max_results: limit,
        include_related: params.include_related,
        include_trends: params.include_trends,
        cache_ttl_seconds: None,
    };

    let result = state.keywords().search_keywords(keyword, options).await?;

    if let Some(user) = user_id(&headers) {
        state.history().record(user, keyword, &result).await;
    }

    info!(
        keyword,
        total_results = result.total_results,
        cached = result.cached,
        "Keyword search served"
    );

    let meta = serde_json::json!({
        "keyword": keyword,
        "limit": limit,
        "includeRelated": params.include_related,
        "includeTrends": params.include_trends,
    });
    Ok(Json(ApiResponse::success(result).with_meta(meta)))
}

pub async fn related_keywords(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RelatedParams>,
) -> Result<Json<ApiResponse<Vec<KeywordRecord>>>, ApiError> {
    let keyword = validate_keyword(params.keyword.as_deref())?;
    let selection = parse_platforms(None, params.platforms.as_deref())?;

    let related = state.keywords().related_keywords(keyword, &selection).await;
    let meta = serde_json::json!({ "keyword": keyword, "count": related.len() });
    Ok(Json(ApiResponse::success(related).with_meta(meta)))
}

pub async fn trending_keywords(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TrendingParams>,
) -> Result<Json<ApiResponse<Vec<KeywordRecord>>>, ApiError> {
    let platform = parse_single_platform(params.platform.as_deref())?;
    let trending = state.keywords().trending_keywords(platform).await;
    Ok(Json(ApiResponse::success(trending)))
}

fn require_user(headers: &HeaderMap) -> Result<&str, ApiError> {
    user_id(headers).ok_or_else(|| ApiError::unauthorized("X-User-Id header is required"))
}

pub async fn bulk_analyze(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BulkAnalyzeRequest>,
) -> Result<Json<ApiResponse<BulkAnalysis>>, ApiError> {
    if request.keywords.is_empty() {
        return Err(ApiError::validation("Keywords array is required"));
    }
    let keywords = request
        .keywords
        .iter()
        .map(|k| validate_keyword(Some(k)).map(str::to_string))
        .collect::<Result<Vec<_>, _>>()?;

    let selection = parse_platforms(request.platform.as_deref(), request.platforms.as_deref())?;
    let limit = validate_limit(request.limit.unwrap_or(DEFAULT_BULK_LIMIT), MAX_LIMIT)?;

    let options = SearchOptions {
        platforms: selection,
        max_results: limit,
        ..SearchOptions::default()
    };

    let analysis = state.keywords().bulk_analyze(&keywords, options).await?;
    info!(
        keywords = analysis.total_keywords,
        search_time_ms = analysis.search_time_ms,
        "Bulk analysis served"
    );
    Ok(Json(ApiResponse::success(analysis)))
}

pub async fn add_favorite(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<FavoriteRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Favorite>>), ApiError> {
    let user = require_user(&headers)?;
    let keyword = validate_keyword(request.keyword.as_deref())?;
    let platform = parse_required_platform(request.platform.as_deref())?;

    let (favorite, created) = state.favorites().add(user, keyword, platform).await;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(ApiResponse::success(favorite))))
}

pub async fn remove_favorite(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let user = require_user(&headers)?;

    if !state.favorites().remove(user, &id).await {
        return Err(ApiError::not_found("Favorite", &id));
    }
    Ok(Json(ApiResponse::success(serde_json::json!({ "id": id }))))
}

pub async fn list_favorites(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<PageParams>,
) -> Result<Json<ApiResponse<FavoritesPage>>, ApiError> {
    let user = require_user(&headers)?;

    let limit = validate_limit(params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT), MAX_LIMIT)?;
    let offset = params.offset.unwrap_or(0);

    let page = state.favorites().list(user, limit, offset).await;
    let meta = serde_json::json!({ "limit": limit, "offset": offset, "total": page.total });
    Ok(Json(ApiResponse::success(page).with_meta(meta)))
}

pub async fn search_history(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<PageParams>,
) -> Result<Json<ApiResponse<HistoryPage>>, ApiError> {
    let user = require_user(&headers)?;

    let limit = validate_limit(params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT), MAX_LIMIT)?;
    let offset = params.offset.unwrap_or(0);

    let page = state.history().list(user, limit, offset).await;
    let meta = serde_json::json!({ "limit": limit, "offset": offset, "total": page.total });
    Ok(Json(ApiResponse::success(page).with_meta(meta)))
}

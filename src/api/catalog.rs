use axum::{
    Json,
    extract::{Path, Query, State},
};
use std::sync::Arc;

use super::validation::{parse_required_platform, validate_limit, validate_native_id};
use super::{ApiError, ApiResponse, AppState, ListingsParams};
use crate::models::{Category, ItemDetails, KeywordRecord};

const DEFAULT_LISTINGS_LIMIT: usize = 50;
const MAX_LISTINGS_LIMIT: usize = 100;

pub async fn list_categories(
    State(state): State<Arc<AppState>>,
    Path(platform): Path<String>,
) -> Result<Json<ApiResponse<Vec<Category>>>, ApiError> {
    let platform = parse_required_platform(Some(&platform))?;

    let categories = state.keywords().categories(platform).await?;
    let meta = serde_json::json!({ "platform": platform, "count": categories.len() });
    Ok(Json(ApiResponse::success(categories).with_meta(meta)))
}

pub async fn item_details(
    State(state): State<Arc<AppState>>,
    Path((platform, item_id)): Path<(String, String)>,
) -> Result<Json<ApiResponse<ItemDetails>>, ApiError> {
    let platform = parse_required_platform(Some(&platform))?;
    let item_id = validate_native_id("item", &item_id)?;

    state
        .keywords()
        .item_details(platform, item_id)
        .await?
        .map(|details| Json(ApiResponse::success(details)))
        .ok_or_else(|| ApiError::not_found("Item", item_id))
}

/// Listings of an Etsy shop or a Shopify collection.
pub async fn group_listings(
    State(state): State<Arc<AppState>>,
    Path((platform, group_id)): Path<(String, String)>,
    Query(params): Query<ListingsParams>,
) -> Result<Json<ApiResponse<Vec<KeywordRecord>>>, ApiError> {
    let platform = parse_required_platform(Some(&platform))?;
    let group_id = validate_native_id("group", &group_id)?;
    let limit = validate_limit(
        params.limit.unwrap_or(DEFAULT_LISTINGS_LIMIT),
        MAX_LISTINGS_LIMIT,
    )?;

    let listings = state
        .keywords()
        .group_listings(platform, group_id, limit)
        .await?;
    let meta = serde_json::json!({
        "platform": platform,
        "groupId": group_id,
        "limit": limit,
        "count": listings.len(),
    });
    Ok(Json(ApiResponse::success(listings).with_meta(meta)))
}

//! Domain service for cross-marketplace keyword research.
//!
//! The HTTP handlers and the CLI only see this trait; the aggregation over
//! the marketplace adapters lives in [`super::AggregationService`].

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clients::RateLimitInfo;
use crate::domain::Platform;
use crate::models::{
    AggregatedSearchResult, BulkAnalysis, Category, ItemDetails, KeywordRecord, PlatformSelection,
    SearchOptions,
};

/// Errors surfaced by keyword operations.
///
/// Marketplace failures never show up here; they are logged and replaced
/// by an empty contribution.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Search timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0} is not enabled")]
    PlatformUnavailable(Platform),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformStatus {
    Active,
    /// No adapter is registered, usually because the platform is disabled
    /// in the configuration.
    Disabled,
}

/// Static facts about one marketplace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformStats {
    pub name: String,
    pub status: PlatformStatus,
    pub last_checked: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitInfo>,
    pub features: Vec<String>,
    pub supports_trending: bool,
}

#[async_trait::async_trait]
pub trait KeywordService: Send + Sync {
    /// Fans `query` out to the selected marketplaces and ranks the merged
    /// records by `search_volume * potential_revenue`.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Validation`] for an empty query, a zero
    /// result limit or a selection naming no known platform, and
    /// [`SearchError::Timeout`] when the whole call exceeds its deadline.
    async fn search_keywords(
        &self,
        query: &str,
        options: SearchOptions,
    ) -> Result<AggregatedSearchResult, SearchError>;

    /// Placeholder records for terms seen alongside `query`.
    async fn related_keywords(
        &self,
        query: &str,
        selection: &PlatformSelection,
    ) -> Vec<KeywordRecord>;

    /// Highest-volume trending records, for one platform or all of them.
    async fn trending_keywords(&self, platform: Option<Platform>) -> Vec<KeywordRecord>;

    async fn platform_stats(&self) -> BTreeMap<Platform, PlatformStats>;

    /// Runs a one-result probe search against every registered marketplace.
    async fn health_check(&self) -> BTreeMap<Platform, bool>;

    /// Runs [`Self::search_keywords`] for each distinct keyword in the list.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Validation`] for an empty list or one longer
    /// than the bulk limit. Per-keyword failures are reported inside the
    /// analysis.
    async fn bulk_analyze(
        &self,
        keywords: &[String],
        options: SearchOptions,
    ) -> Result<BulkAnalysis, SearchError>;

    /// Categories or collections of one marketplace.
    async fn categories(&self, platform: Platform) -> Result<Vec<Category>, SearchError>;

    async fn item_details(
        &self,
        platform: Platform,
        item_id: &str,
    ) -> Result<Option<ItemDetails>, SearchError>;

    /// Listings of one shop (Etsy) or collection (Shopify).
    async fn group_listings(
        &self,
        platform: Platform,
        group_id: &str,
        limit: usize,
    ) -> Result<Vec<KeywordRecord>, SearchError>;

    /// Platforms that have an adapter registered, in dispatch order.
    fn registered_platforms(&self) -> Vec<Platform>;
}

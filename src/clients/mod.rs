//! Marketplace adapters.
//!
//! Each adapter wraps one marketplace API behind [`PlatformAdapter`]. They
//! share the cache-first search flow, the related/trending derivations,
//! catalogue lookups and response decoding defined here.

pub mod amazon;
pub mod ebay;
pub mod estimator;
pub mod etsy;
pub mod gumroad;
pub mod scoring;
pub mod shopify;
pub mod throttle;

pub use amazon::AmazonAdapter;
pub use ebay::EbayAdapter;
pub use estimator::{FixedEstimator, RandomEstimator, VolumeEstimator};
pub use etsy::EtsyAdapter;
pub use gumroad::GumroadAdapter;
pub use shopify::ShopifyAdapter;
pub use throttle::Throttle;

use std::future::Future;
use std::sync::Arc;

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::CacheService;
use crate::domain::{Platform, normalize_term};
use crate::models::{Category, ItemDetails, KeywordRecord};

/// TTL for per-adapter search, related and trending entries.
pub const ADAPTER_CACHE_TTL_SECONDS: u64 = 3600;

/// Category and collection trees change rarely.
pub const CATALOG_CACHE_TTL_SECONDS: u64 = 86_400;

/// Single item and shop/collection listing lookups.
pub const DETAILS_CACHE_TTL_SECONDS: u64 = 1800;

/// Result count used when deriving related terms from a search.
const RELATED_SEARCH_SIZE: usize = 20;
const RELATED_LIMIT: usize = 10;

/// Results taken per trending seed query, and the trending list size.
const TRENDING_PER_SEED: usize = 5;
const TRENDING_LIMIT: usize = 20;

/// Seed queries for marketplaces that skew towards digital goods.
pub(crate) const DIGITAL_GOODS_SEEDS: [&str; 10] = [
    "digital download",
    "printable",
    "template",
    "planner",
    "sticker",
    "wall art",
    "invitation",
    "business card",
    "logo",
    "banner",
];

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("{platform} authentication failed: {message}")]
    Auth { platform: Platform, message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{platform} returned HTTP {status}: {body}")]
    Status {
        platform: Platform,
        status: u16,
        body: String,
    },

    #[error("failed to decode {platform} response: {message}")]
    Decode { platform: Platform, message: String },

    #[error("{platform} credentials are not configured")]
    NotConfigured { platform: Platform },

    #[error("invalid endpoint URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Published request budget for a marketplace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitInfo {
    pub requests_per_second: u32,
    pub requests_per_day: u32,
}

#[async_trait::async_trait]
pub trait PlatformAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    /// Listings for `query`, sorted by descending search volume and at
    /// most `max_results` long.
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<KeywordRecord>, AdapterError>;

    /// Up to ten terms seen alongside `query`, excluding `query` itself.
    async fn related_keywords(&self, query: &str) -> Result<Vec<String>, AdapterError>;

    async fn trending(&self, _category: Option<&str>) -> Result<Vec<KeywordRecord>, AdapterError> {
        Ok(Vec::new())
    }

    fn supports_trending(&self) -> bool {
        false
    }

    /// Categories or collections the marketplace exposes.
    async fn categories(&self) -> Result<Vec<Category>, AdapterError> {
        Ok(Vec::new())
    }

    /// One listing by its marketplace id, `None` when it does not exist or
    /// the marketplace has no lookup.
    async fn item_details(&self, _item_id: &str) -> Result<Option<ItemDetails>, AdapterError> {
        Ok(None)
    }

    /// Active listings inside one shop or collection.
    async fn group_listings(
        &self,
        _group_id: &str,
        _limit: usize,
    ) -> Result<Vec<KeywordRecord>, AdapterError> {
        Ok(Vec::new())
    }

    fn features(&self) -> &'static [&'static str] {
        &[]
    }

    fn rate_limit(&self) -> RateLimitInfo;
}

/// Builds the HTTP client shared by every adapter.
pub fn build_http_client(timeout_seconds: u64, user_agent: &str) -> anyhow::Result<Client> {
    Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_seconds))
        .user_agent(user_agent)
        .pool_max_idle_per_host(10)
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build shared HTTP client: {e}"))
}

/// Sends a request and returns the response once its status is a success.
async fn send_checked(
    platform: Platform,
    request: RequestBuilder,
) -> Result<reqwest::Response, AdapterError> {
    let response = request.send().await?;
    let status = response.status();

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AdapterError::Status {
            platform,
            status: status.as_u16(),
            body: truncate_body(body),
        });
    }
    Ok(response)
}

/// Sends a request and decodes a JSON body, mapping failures to
/// [`AdapterError`].
pub(crate) async fn fetch_json<T: DeserializeOwned>(
    platform: Platform,
    request: RequestBuilder,
) -> Result<T, AdapterError> {
    let bytes = send_checked(platform, request).await?.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| AdapterError::Decode {
        platform,
        message: e.to_string(),
    })
}

/// Same as [`fetch_json`] for XML bodies.
pub(crate) async fn fetch_xml<T: DeserializeOwned>(
    platform: Platform,
    request: RequestBuilder,
) -> Result<T, AdapterError> {
    let text = send_checked(platform, request).await?.text().await?;
    quick_xml::de::from_str(&text).map_err(|e| AdapterError::Decode {
        platform,
        message: e.to_string(),
    })
}

fn truncate_body(mut body: String) -> String {
    const LIMIT: usize = 512;
    if body.len() > LIMIT {
        let mut cut = LIMIT;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    body
}

#[must_use]
pub fn search_cache_key(platform: Platform, query: &str, max_results: usize) -> String {
    format!("{platform}:{}:{max_results}", normalize_term(query))
}

/// Sorts by descending search volume and truncates. The sort is stable.
pub(crate) fn rank_by_volume(mut records: Vec<KeywordRecord>, max: usize) -> Vec<KeywordRecord> {
    records.sort_by(|a, b| b.search_volume.cmp(&a.search_volume));
    records.truncate(max);
    records
}

/// Cache-first wrapper around an adapter's paginated fetch.
///
/// `fetch` is only polled on a cache miss. Empty results are not cached so
/// that a marketplace outage does not stick for an hour.
pub(crate) async fn cached_search<F>(
    platform: Platform,
    cache: &CacheService,
    query: &str,
    max_results: usize,
    fetch: F,
) -> Result<Vec<KeywordRecord>, AdapterError>
where
    F: Future<Output = Result<Vec<KeywordRecord>, AdapterError>> + Send,
{
    let key = search_cache_key(platform, query, max_results);

    if let Some(hit) = cache.get_json::<Vec<KeywordRecord>>(&key).await {
        debug!(%platform, query, "Adapter cache hit");
        return Ok(hit);
    }

    info!(%platform, query, max_results, "Searching marketplace");
    let records = rank_by_volume(fetch.await?, max_results);

    if !records.is_empty() {
        cache
            .set_json(&key, &records, ADAPTER_CACHE_TTL_SECONDS)
            .await;
    }

    info!(%platform, query, found = records.len(), "Marketplace search finished");
    Ok(records)
}

/// Cache-first wrapper for catalogue and detail lookups.
///
/// Values for which `worth_caching` is false (empty lists, missing items)
/// are returned but not stored.
pub(crate) async fn cached_lookup<T, F>(
    cache: &CacheService,
    key: &str,
    ttl_seconds: u64,
    worth_caching: fn(&T) -> bool,
    fetch: F,
) -> Result<T, AdapterError>
where
    T: Serialize + DeserializeOwned + Send + Sync,
    F: Future<Output = Result<T, AdapterError>> + Send,
{
    if let Some(hit) = cache.get_json::<T>(key).await {
        debug!(key, "Catalogue cache hit");
        return Ok(hit);
    }

    let value = fetch.await?;
    if worth_caching(&value) {
        cache.set_json(key, &value, ttl_seconds).await;
    }
    Ok(value)
}

/// Terms from a 20 result search that differ from the query, first ten.
pub(crate) async fn related_from_search<A>(
    adapter: &A,
    cache: &CacheService,
    query: &str,
) -> Result<Vec<String>, AdapterError>
where
    A: PlatformAdapter + ?Sized,
{
    let platform = adapter.platform();
    let normalized = normalize_term(query);
    let key = format!("{platform}:related:{normalized}");

    if let Some(hit) = cache.get_json::<Vec<String>>(&key).await {
        return Ok(hit);
    }

    let records = adapter.search(query, RELATED_SEARCH_SIZE).await?;

    let mut related: Vec<String> = Vec::new();
    for term in records.into_iter().map(|r| r.term) {
        if term != normalized && !related.contains(&term) {
            related.push(term);
        }
        if related.len() == RELATED_LIMIT {
            break;
        }
    }

    if !related.is_empty() {
        cache
            .set_json(&key, &related, ADAPTER_CACHE_TTL_SECONDS)
            .await;
    }
    Ok(related)
}

/// Searches each seed query for a handful of results and keeps the
/// highest-volume twenty. A failing seed is skipped.
pub(crate) async fn trending_from_seeds<A>(
    adapter: &A,
    cache: &CacheService,
    seeds: &[&str],
    category: Option<&str>,
) -> Vec<KeywordRecord>
where
    A: PlatformAdapter + ?Sized,
{
    let platform = adapter.platform();
    let key = format!("{platform}:trending:{}", category.unwrap_or("all"));

    if let Some(hit) = cache.get_json::<Vec<KeywordRecord>>(&key).await {
        return hit;
    }

    let mut collected = Vec::new();
    for seed in seeds {
        match adapter.search(seed, TRENDING_PER_SEED).await {
            Ok(records) => collected.extend(records),
            Err(e) => warn!(%platform, seed, error = %e, "Trending seed search failed"),
        }
    }

    let trending = rank_by_volume(collected, TRENDING_LIMIT);
    if !trending.is_empty() {
        cache
            .set_json(&key, &trending, ADAPTER_CACHE_TTL_SECONDS)
            .await;
    }
    trending
}

/// Logs a failed page and tells the pagination loop to stop.
pub(crate) fn log_page_failure(platform: Platform, position: usize, error: &AdapterError) {
    warn!(%platform, position, error = %error, "Marketplace page failed, keeping partial results");
}

/// Shared pieces each adapter is built from.
#[derive(Clone)]
pub struct AdapterDeps {
    pub http: Client,
    pub cache: CacheService,
    pub estimator: Arc<dyn VolumeEstimator>,
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::domain::{Competition, Difficulty, Trend};
    use crate::models::KeywordMetrics;

    pub fn deps() -> AdapterDeps {
        AdapterDeps {
            http: Client::new(),
            cache: CacheService::in_memory(),
            estimator: Arc::new(FixedEstimator::default()),
        }
    }

    pub fn record(platform: Platform, id: &str, term: &str, volume: u64) -> KeywordRecord {
        KeywordRecord::new(
            platform,
            id,
            term,
            KeywordMetrics {
                search_volume: volume,
                trend: Trend::Stable,
                competition: Competition::Low,
                competition_score: None,
                potential_revenue: 1.0,
                cpc: 0.5,
                difficulty: Difficulty::clamped(40),
            },
        )
        .expect("valid record")
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::record;
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        cache: CacheService,
        calls: AtomicUsize,
        terms: Vec<&'static str>,
    }

    #[async_trait::async_trait]
    impl PlatformAdapter for Scripted {
        fn platform(&self) -> Platform {
            Platform::Etsy
        }

        async fn search(
            &self,
            query: &str,
            max_results: usize,
        ) -> Result<Vec<KeywordRecord>, AdapterError> {
            let terms = self.terms.clone();
            cached_search(Platform::Etsy, &self.cache, query, max_results, async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Ok(terms
                    .iter()
                    .enumerate()
                    .map(|(i, t)| record(Platform::Etsy, &i.to_string(), t, (i as u64 + 1) * 10))
                    .collect())
            })
            .await
        }

        async fn related_keywords(&self, query: &str) -> Result<Vec<String>, AdapterError> {
            related_from_search(self, &self.cache, query).await
        }

        fn rate_limit(&self) -> RateLimitInfo {
            RateLimitInfo {
                requests_per_second: 1,
                requests_per_day: 1,
            }
        }
    }

    fn scripted(terms: Vec<&'static str>) -> Scripted {
        Scripted {
            cache: CacheService::in_memory(),
            calls: AtomicUsize::new(0),
            terms,
        }
    }

    #[tokio::test]
    async fn search_is_cache_first() {
        let adapter = scripted(vec!["a", "b", "c"]);

        let first = adapter.search("Planner", 2).await.unwrap();
        let second = adapter.search("planner", 2).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].term, "c");
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 1);
        assert!(adapter.cache.exists("etsy:planner:2").await);
    }

    #[tokio::test]
    async fn empty_results_are_not_cached() {
        let adapter = scripted(vec![]);
        assert!(adapter.search("x", 5).await.unwrap().is_empty());
        assert!(adapter.search("x", 5).await.unwrap().is_empty());
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn related_excludes_query_and_duplicates() {
        let adapter = scripted(vec!["planner", "daily planner", "daily planner", "sticker"]);
        let related = adapter.related_keywords("Planner").await.unwrap();
        assert_eq!(related, vec!["sticker".to_string(), "daily planner".to_string()]);
    }

    #[tokio::test]
    async fn trending_default_is_empty() {
        let adapter = scripted(vec!["a"]);
        assert!(!adapter.supports_trending());
        assert!(adapter.trending(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn lookups_skip_caching_missing_values() {
        let cache = CacheService::in_memory();

        let missing: Option<String> =
            cached_lookup(&cache, "etsy:item:1", 60, Option::is_some, async { Ok(None) })
                .await
                .unwrap();
        assert!(missing.is_none());
        assert!(!cache.exists("etsy:item:1").await);

        let found = cached_lookup(&cache, "etsy:item:1", 60, Option::is_some, async {
            Ok(Some("mug".to_string()))
        })
        .await
        .unwrap();
        assert_eq!(found.as_deref(), Some("mug"));

        // A hit never polls the fetch.
        let again: Option<String> =
            cached_lookup(&cache, "etsy:item:1", 60, Option::is_some, async {
                Err(AdapterError::NotConfigured {
                    platform: Platform::Etsy,
                })
            })
            .await
            .unwrap();
        assert_eq!(again, found);
    }

    #[tokio::test]
    async fn catalogue_defaults_are_empty() {
        let adapter = scripted(vec!["a"]);
        assert!(adapter.categories().await.unwrap().is_empty());
        assert!(adapter.item_details("1").await.unwrap().is_none());
        assert!(adapter.group_listings("shop", 5).await.unwrap().is_empty());
    }

    #[test]
    fn rank_is_stable_for_ties() {
        let records = vec![
            record(Platform::Etsy, "1", "first", 10),
            record(Platform::Etsy, "2", "second", 10),
            record(Platform::Etsy, "3", "third", 20),
        ];
        let ranked = rank_by_volume(records, 3);
        let terms: Vec<_> = ranked.iter().map(|r| r.term.as_str()).collect();
        assert_eq!(terms, ["third", "first", "second"]);
    }

    #[test]
    fn long_error_bodies_are_truncated() {
        let body = "é".repeat(400);
        let cut = truncate_body(body);
        assert!(cut.len() <= 512);
    }
}

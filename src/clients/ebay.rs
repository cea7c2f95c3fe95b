use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;
use url::Url;

use super::estimator::VolumeEstimator;
use super::scoring::{self, jittered};
use super::{
    AdapterDeps, AdapterError, CATALOG_CACHE_TTL_SECONDS, DETAILS_CACHE_TTL_SECONDS,
    PlatformAdapter, RateLimitInfo, Throttle, cached_lookup, cached_search, fetch_json,
    log_page_failure, related_from_search, trending_from_seeds,
};
use crate::cache::CacheService;
use crate::config::EbayConfig;
use crate::domain::{Competition, Platform, Trend};
use crate::models::{Category, ItemDetails, KeywordMetrics, KeywordRecord};

const PAGE_LIMIT: usize = 200;
const OFFSET_CEILING: usize = 10_000;

const TOKEN_PATH: &str = "/identity/v1/oauth2/token";
const SEARCH_PATH: &str = "/buy/browse/v1/item_summary/search";
const ITEM_PATH: &str = "/buy/browse/v1/item";
const CATEGORY_TREE_PATH: &str = "/commerce/taxonomy/v1/category_tree/0";
const OAUTH_SCOPE: &str = "https://api.ebay.com/oauth/api_scope";

/// Tokens are treated as expired this long before eBay says they are.
const TOKEN_MARGIN: Duration = Duration::from_secs(60);

pub(crate) const TRENDING_SEEDS: [&str; 10] = [
    "vintage",
    "collectible",
    "rare",
    "antique",
    "retro",
    "limited edition",
    "new in box",
    "mint condition",
    "original",
    "authentic",
];

const CPC_RATES: [(&str, f64); 7] = [
    ("electronics", 2.0),
    ("fashion", 1.5),
    ("home & garden", 1.2),
    ("collectibles", 0.8),
    ("sporting goods", 1.8),
    ("toys & hobbies", 1.0),
    ("books", 0.5),
];

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    item_summaries: Vec<EbayItem>,
}

#[derive(Debug, Deserialize)]
struct CategoryTreeResponse {
    #[serde(default)]
    categories: Vec<EbayCategory>,
}

/// Item lookups come back either bare or wrapped in an `items` list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ItemLookup {
    Wrapped { items: Vec<EbayItem> },
    Single(Box<EbayItem>),
}

impl ItemLookup {
    fn into_first(self) -> Option<EbayItem> {
        match self {
            Self::Wrapped { items } => items.into_iter().next(),
            Self::Single(item) => Some(*item),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EbayAmount {
    pub value: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SellingStatus {
    pub current_price: Option<EbayAmount>,
    pub bid_count: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingInfo {
    pub listing_type: Option<String>,
    pub watch_count: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EbayCategory {
    pub category_id: Option<String>,
    pub category_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EbayItem {
    pub item_id: Option<String>,
    pub title: Option<String>,
    pub price: Option<EbayAmount>,
    pub selling_status: Option<SellingStatus>,
    pub listing_info: Option<ListingInfo>,
    pub primary_category: Option<EbayCategory>,
    #[serde(default)]
    pub categories: Vec<EbayCategory>,
    pub bid_count: Option<u64>,
}

impl EbayItem {
    fn bids(&self) -> u64 {
        self.selling_status
            .as_ref()
            .and_then(|s| s.bid_count)
            .or(self.bid_count)
            .unwrap_or(0)
    }

    fn watchers(&self) -> u64 {
        self.listing_info
            .as_ref()
            .and_then(|l| l.watch_count)
            .unwrap_or(0)
    }

    fn price(&self) -> f64 {
        self.selling_status
            .as_ref()
            .and_then(|s| s.current_price.as_ref())
            .or(self.price.as_ref())
            .map_or(0.0, |p| scoring::parse_price(&p.value))
    }

    fn category(&self) -> Option<&EbayCategory> {
        self.primary_category
            .as_ref()
            .or_else(|| self.categories.first())
    }

    fn is_auction(&self) -> bool {
        self.listing_info
            .as_ref()
            .and_then(|l| l.listing_type.as_deref())
            .is_some_and(|t| t.eq_ignore_ascii_case("AUCTION"))
    }
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

pub struct EbayAdapter {
    config: EbayConfig,
    http: Client,
    cache: CacheService,
    estimator: Arc<dyn VolumeEstimator>,
    throttle: Throttle,
    token: Mutex<Option<AccessToken>>,
}

impl EbayAdapter {
    #[must_use]
    pub fn new(config: EbayConfig, deps: AdapterDeps) -> Self {
        Self {
            throttle: Throttle::from_millis(config.rate_limit_ms),
            config,
            http: deps.http,
            cache: deps.cache,
            estimator: deps.estimator,
            token: Mutex::new(None),
        }
    }

    fn auth_error(message: impl Into<String>) -> AdapterError {
        AdapterError::Auth {
            platform: Platform::Ebay,
            message: message.into(),
        }
    }

    /// Client-credentials token, refreshed once it is within a minute of
    /// expiring.
    async fn access_token(&self) -> Result<String, AdapterError> {
        let mut token = self.token.lock().await;

        if let Some(current) = token.as_ref().filter(|t| Instant::now() < t.expires_at) {
            return Ok(current.value.clone());
        }

        debug!("Requesting eBay access token");
        let url = format!("{}{TOKEN_PATH}", self.config.api_base());
        self.throttle.wait().await;
        let response = self
            .http
            .post(url)
            .basic_auth(&self.config.app_id, Some(&self.config.cert_id))
            .form(&[("grant_type", "client_credentials"), ("scope", OAUTH_SCOPE)])
            .send()
            .await
            .map_err(|e| Self::auth_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::auth_error(format!("status={status}, body={body}")));
        }

        let issued: TokenResponse = response
            .json()
            .await
            .map_err(|e| Self::auth_error(format!("invalid token response: {e}")))?;

        let lifetime = Duration::from_secs(issued.expires_in).saturating_sub(TOKEN_MARGIN);
        let value = issued.access_token;
        *token = Some(AccessToken {
            value: value.clone(),
            expires_at: Instant::now() + lifetime,
        });

        Ok(value)
    }

    /// GET with the bearer token, after the throttle.
    async fn get_authorized<T: DeserializeOwned>(&self, url: Url) -> Result<T, AdapterError> {
        let token = self.access_token().await?;

        self.throttle.wait().await;

        let request = self.http.get(url).bearer_auth(token);
        fetch_json(Platform::Ebay, request).await
    }

    fn ensure_configured(&self) -> Result<(), AdapterError> {
        if self.config.is_configured() {
            Ok(())
        } else {
            Err(AdapterError::NotConfigured {
                platform: Platform::Ebay,
            })
        }
    }

    async fn fetch_page(
        &self,
        query: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<EbayItem>, AdapterError> {
        let mut url = Url::parse(&format!("{}{SEARCH_PATH}", self.config.api_base()))?;
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("limit", &limit.to_string())
            .append_pair("offset", &offset.to_string());

        let response: SearchResponse = self.get_authorized(url).await?;
        Ok(response.item_summaries)
    }

    async fn fetch_categories(&self) -> Result<Vec<Category>, AdapterError> {
        self.ensure_configured()?;

        let url = Url::parse(&format!("{}{CATEGORY_TREE_PATH}", self.config.api_base()))?;
        let response: CategoryTreeResponse = self.get_authorized(url).await?;

        Ok(response
            .categories
            .into_iter()
            .filter_map(|c| {
                Some(Category {
                    platform: Platform::Ebay,
                    id: c.category_id.filter(|id| !id.is_empty())?,
                    name: c.category_name.filter(|n| !n.trim().is_empty())?,
                    path: Vec::new(),
                })
            })
            .collect())
    }

    async fn fetch_item(&self, item_id: &str) -> Result<Option<ItemDetails>, AdapterError> {
        self.ensure_configured()?;

        let url = Url::parse(&format!(
            "{}{ITEM_PATH}/{}",
            self.config.api_base(),
            urlencoding::encode(item_id)
        ))?;
        let lookup: ItemLookup = match self.get_authorized(url).await {
            Ok(lookup) => lookup,
            Err(AdapterError::Status { status: 404, .. }) => return Ok(None),
            Err(e) => return Err(e),
        };

        Ok(lookup
            .into_first()
            .and_then(|item| item_to_details(&item, self.estimator.as_ref())))
    }

    async fn fetch_all(&self, query: &str, max: usize) -> Result<Vec<KeywordRecord>, AdapterError> {
        self.ensure_configured()?;

        // Fail the whole call up front when credentials are rejected.
        self.access_token().await?;

        let limit = PAGE_LIMIT.min(max);
        let mut offset = 0;
        let mut records = Vec::new();

        while records.len() < max && offset < OFFSET_CEILING {
            let page = match self.fetch_page(query, limit, offset).await {
                Ok(page) => page,
                Err(e @ AdapterError::Auth { .. }) => return Err(e),
                Err(e) => {
                    log_page_failure(Platform::Ebay, offset, &e);
                    break;
                }
            };

            if page.is_empty() {
                break;
            }
            let short_page = page.len() < limit;

            records.extend(
                page.iter()
                    .filter_map(|item| item_to_record(item, query, self.estimator.as_ref())),
            );

            if short_page {
                break;
            }
            offset += limit;
        }

        Ok(records)
    }
}

#[async_trait::async_trait]
impl PlatformAdapter for EbayAdapter {
    fn platform(&self) -> Platform {
        Platform::Ebay
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<KeywordRecord>, AdapterError> {
        cached_search(
            Platform::Ebay,
            &self.cache,
            query,
            max_results,
            self.fetch_all(query, max_results),
        )
        .await
    }

    async fn related_keywords(&self, query: &str) -> Result<Vec<String>, AdapterError> {
        related_from_search(self, &self.cache, query).await
    }

    async fn trending(&self, category: Option<&str>) -> Result<Vec<KeywordRecord>, AdapterError> {
        Ok(trending_from_seeds(self, &self.cache, &TRENDING_SEEDS, category).await)
    }

    fn supports_trending(&self) -> bool {
        true
    }

    async fn categories(&self) -> Result<Vec<Category>, AdapterError> {
        cached_lookup(
            &self.cache,
            "ebay:categories",
            CATALOG_CACHE_TTL_SECONDS,
            |c: &Vec<Category>| !c.is_empty(),
            self.fetch_categories(),
        )
        .await
    }

    async fn item_details(&self, item_id: &str) -> Result<Option<ItemDetails>, AdapterError> {
        cached_lookup(
            &self.cache,
            &format!("ebay:item:{item_id}"),
            DETAILS_CACHE_TTL_SECONDS,
            Option::is_some,
            self.fetch_item(item_id),
        )
        .await
    }

    fn features(&self) -> &'static [&'static str] {
        &["auctions", "buy_it_now", "categories", "seller_info"]
    }

    fn rate_limit(&self) -> RateLimitInfo {
        RateLimitInfo {
            requests_per_second: 5,
            requests_per_day: 5000,
        }
    }
}

fn estimate_volume(item: &EbayItem, estimator: &dyn VolumeEstimator) -> u64 {
    let bids = item.bids();
    let watchers = item.watchers();
    let category_id: u64 = item
        .category()
        .and_then(|c| c.category_id.as_deref())
        .and_then(|id| id.parse().ok())
        .unwrap_or(0);

    let mut base = 100;

    base += match bids {
        b if b > 10 => 2000,
        b if b > 5 => 1000,
        b if b > 0 => 500,
        _ => 0,
    };

    base += match watchers {
        w if w > 50 => 1000,
        w if w > 20 => 500,
        w if w > 5 => 200,
        _ => 0,
    };

    base += match category_id {
        id if id >= 58_058 => 1000,
        id if id >= 11_450 => 800,
        _ => 0,
    };

    jittered(estimator, base, base)
}

fn competition(item: &EbayItem) -> Competition {
    let price = item.price();
    let bids = item.bids();
    let watchers = item.watchers();

    if price > 100.0 && (bids > 5 || watchers > 20) {
        Competition::High
    } else if price > 50.0 && (bids > 2 || watchers > 10) {
        Competition::Medium
    } else {
        Competition::Low
    }
}

fn trend(item: &EbayItem) -> Trend {
    let bids = item.bids();
    let watchers = item.watchers();

    if (item.is_auction() && bids > 5) || watchers > 20 {
        Trend::Up
    } else if bids > 0 || watchers > 5 {
        Trend::Stable
    } else {
        Trend::Down
    }
}

pub(crate) fn item_to_record(
    item: &EbayItem,
    query: &str,
    estimator: &dyn VolumeEstimator,
) -> Option<KeywordRecord> {
    let id = item.item_id.as_deref().filter(|id| !id.is_empty())?;
    let title = item.title.as_deref().filter(|t| !t.trim().is_empty())?;

    let volume = estimate_volume(item, estimator);
    let competition = competition(item);
    let category = item
        .category()
        .and_then(|c| c.category_name.as_deref())
        .unwrap_or("");

    let metrics = KeywordMetrics {
        search_volume: volume,
        trend: trend(item),
        competition,
        competition_score: None,
        potential_revenue: scoring::potential_revenue(
            Platform::Ebay,
            volume,
            item.price(),
            competition,
        ),
        cpc: scoring::cpc_containing(&CPC_RATES, category, 1.0),
        difficulty: scoring::difficulty(Platform::Ebay, competition, volume),
    };

    KeywordRecord::new(
        Platform::Ebay,
        id,
        &scoring::extract_term(query, &[], title),
        metrics,
    )
}

fn item_to_details(item: &EbayItem, estimator: &dyn VolumeEstimator) -> Option<ItemDetails> {
    let id = item.item_id.as_deref().filter(|id| !id.is_empty())?;
    let title = item.title.as_deref().filter(|t| !t.trim().is_empty())?;
    let priced = item.price.is_some()
        || item
            .selling_status
            .as_ref()
            .is_some_and(|s| s.current_price.is_some());

    Some(ItemDetails {
        platform: Platform::Ebay,
        id: id.to_string(),
        title: title.to_string(),
        price: priced.then(|| item.price()),
        category: item.category().and_then(|c| c.category_name.clone()),
        tags: Vec::new(),
        keyword: item_to_record(item, "", estimator),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::FixedEstimator;
    use crate::clients::test_support::deps;

    fn item(json: serde_json::Value) -> EbayItem {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn auction_item_maps_to_record() {
        let i = item(serde_json::json!({
            "itemId": "v1|1234|0",
            "title": "Vintage Brass Table Lamp",
            "sellingStatus": { "currentPrice": { "value": "150.00" }, "bidCount": 12 },
            "listingInfo": { "listingType": "AUCTION", "watchCount": 30 },
            "primaryCategory": { "categoryId": "20000", "categoryName": "Home & Garden" }
        }));

        let record = item_to_record(&i, "vintage lamp", &FixedEstimator::default()).unwrap();
        assert_eq!(record.id, "ebay-v1|1234|0");
        assert_eq!(record.term, "vintage lamp");
        // 100 + 2000 bids + 500 watchers + 800 category
        assert_eq!(record.search_volume, 3400);
        assert_eq!(record.competition, Competition::High);
        assert_eq!(record.trend, Trend::Up);
        assert!((record.cpc - 1.2).abs() < f64::EPSILON);
        // 60 + 25 + 10
        assert_eq!(record.difficulty.value(), 95);
    }

    #[test]
    fn browse_api_shape_is_supported() {
        let i = item(serde_json::json!({
            "itemId": "v1|9|0",
            "title": "Signed First Edition",
            "price": { "value": "60.00", "currency": "USD" },
            "categories": [{ "categoryId": "267", "categoryName": "Books & Magazines" }],
            "bidCount": 3
        }));

        assert!((i.price() - 60.0).abs() < f64::EPSILON);
        let record = item_to_record(&i, "novel", &FixedEstimator::default()).unwrap();
        assert_eq!(record.competition, Competition::Medium);
        assert_eq!(record.trend, Trend::Stable);
        assert!((record.cpc - 0.5).abs() < f64::EPSILON);
        assert_eq!(record.term, "signed first edition");
    }

    #[test]
    fn item_lookup_accepts_bare_and_wrapped_items() {
        let bare: ItemLookup = serde_json::from_value(serde_json::json!({
            "itemId": "v1|5|0",
            "title": "Cast Iron Skillet",
            "price": { "value": "35.00", "currency": "USD" }
        }))
        .unwrap();
        let wrapped: ItemLookup = serde_json::from_value(serde_json::json!({
            "items": [{ "itemId": "v1|5|0", "title": "Cast Iron Skillet" }]
        }))
        .unwrap();

        let est = FixedEstimator::default();
        let details = item_to_details(&bare.into_first().unwrap(), &est).unwrap();
        assert_eq!(details.id, "v1|5|0");
        assert_eq!(details.price, Some(35.0));
        assert_eq!(details.keyword.unwrap().term, "cast iron skillet");

        let details = item_to_details(&wrapped.into_first().unwrap(), &est).unwrap();
        assert_eq!(details.price, None);
    }

    #[test]
    fn items_without_title_are_skipped() {
        let i = item(serde_json::json!({ "itemId": "1" }));
        assert!(item_to_record(&i, "x", &FixedEstimator::default()).is_none());
    }

    #[tokio::test]
    async fn missing_credentials_are_reported() {
        let adapter = EbayAdapter::new(EbayConfig::default(), deps());
        assert!(matches!(
            adapter.search("lamp", 5).await,
            Err(AdapterError::NotConfigured { .. })
        ));
    }
}

use std::collections::BTreeMap;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use tracing::warn;
use url::Url;

use super::estimator::VolumeEstimator;
use super::scoring::{self, jittered};
use super::{
    AdapterDeps, AdapterError, DETAILS_CACHE_TTL_SECONDS, PlatformAdapter, RateLimitInfo,
    Throttle, cached_lookup, cached_search, fetch_xml, related_from_search,
};
use crate::cache::CacheService;
use crate::config::AmazonConfig;
use crate::domain::{Competition, Platform, Trend};
use crate::models::{ItemDetails, KeywordMetrics, KeywordRecord};

const SEARCH_PATH: &str = "/onca/xml";

const SEARCH_RESPONSE_GROUP: &str = "ItemAttributes,Offers,SalesRank";
const DETAILS_RESPONSE_GROUP: &str = "ItemAttributes,Offers,Reviews,Images";

/// Indexes searched for every query, in order.
pub const SEARCH_INDEXES: [&str; 6] = [
    "Books",
    "KindleStore",
    "Software",
    "DigitalMusic",
    "VideoGames",
    "Electronics",
];

const CPC_RATES: [(&str, f64); 6] = [
    ("books", 0.5),
    ("kindlestore", 0.3),
    ("software", 1.5),
    ("digitalmusic", 0.8),
    ("videogames", 2.0),
    ("electronics", 2.5),
];

/// Rank assumed for items without one.
const UNRANKED: u64 = 1_000_000;

type HmacSha256 = Hmac<Sha256>;

/// Body of `<ItemSearchResponse>`; the root element name is not checked.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ItemSearchResponse {
    items: Option<Items>,
}

#[derive(Debug, Deserialize)]
struct Items {
    #[serde(rename = "Item", default)]
    item: Vec<AmazonItem>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AmazonMoney {
    pub amount: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OfferSummary {
    pub lowest_new_price: Option<AmazonMoney>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ItemAttributes {
    pub title: Option<String>,
    pub product_group: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AmazonItem {
    #[serde(rename = "ASIN")]
    pub asin: Option<String>,
    pub title: Option<String>,
    pub sales_rank: Option<String>,
    pub list_price: Option<AmazonMoney>,
    pub offer_summary: Option<OfferSummary>,
    pub item_attributes: Option<ItemAttributes>,
}

impl AmazonItem {
    /// Top-level title, or the one nested in the item attributes.
    fn title(&self) -> Option<&str> {
        self.title
            .as_deref()
            .or_else(|| self.item_attributes.as_ref()?.title.as_deref())
            .filter(|t| !t.trim().is_empty())
    }

    fn product_group(&self) -> Option<&str> {
        self.item_attributes.as_ref()?.product_group.as_deref()
    }

    fn sales_rank(&self) -> u64 {
        self.sales_rank
            .as_deref()
            .and_then(|r| r.trim().replace(',', "").parse().ok())
            .filter(|r| *r > 0)
            .unwrap_or(UNRANKED)
    }

    fn offer_price(&self) -> Option<&AmazonMoney> {
        self.offer_summary
            .as_ref()
            .and_then(|o| o.lowest_new_price.as_ref())
    }

    fn has_price(&self) -> bool {
        self.offer_price().is_some() || self.list_price.is_some()
    }

    /// Lowest new offer, falling back to list price.
    fn price(&self) -> f64 {
        self.offer_price()
            .or(self.list_price.as_ref())
            .map_or(0.0, |m| scoring::parse_price(&m.amount))
    }
}

pub struct AmazonAdapter {
    config: AmazonConfig,
    http: Client,
    cache: CacheService,
    estimator: Arc<dyn VolumeEstimator>,
    throttle: Throttle,
}

impl AmazonAdapter {
    #[must_use]
    pub fn new(config: AmazonConfig, deps: AdapterDeps) -> Self {
        Self {
            throttle: Throttle::from_millis(config.rate_limit_ms),
            config,
            http: deps.http,
            cache: deps.cache,
            estimator: deps.estimator,
        }
    }

    /// Host the signature is computed for, with the port when one is set.
    fn signing_host(base: &Url) -> String {
        let host = base.host_str().unwrap_or_default();
        match base.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        }
    }

    /// Signed `ItemSearch` request URL.
    fn item_search_url(
        &self,
        keywords: &str,
        index: &str,
        response_group: &str,
    ) -> Result<Url, AdapterError> {
        let base = self.config.api_base();
        let host = Self::signing_host(&Url::parse(&base)?);

        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let params = BTreeMap::from([
            ("AWSAccessKeyId", self.config.access_key.as_str()),
            ("AssociateTag", self.config.associate_tag.as_str()),
            ("ItemPage", "1"),
            ("Keywords", keywords),
            ("Operation", "ItemSearch"),
            ("ResponseGroup", response_group),
            ("SearchIndex", index),
            ("Service", "AWSECommerceService"),
            ("Sort", "relevancerank"),
            ("Timestamp", timestamp.as_str()),
            ("Version", "2013-08-01"),
        ]);

        let canonical = canonical_query(&params);
        let signature = generate_signature(&self.config.secret_key, &host, &canonical)?;

        Ok(Url::parse(&format!(
            "{base}{SEARCH_PATH}?{canonical}&Signature={}",
            urlencoding::encode(&signature)
        ))?)
    }

    async fn item_search(
        &self,
        keywords: &str,
        index: &str,
        response_group: &str,
    ) -> Result<Vec<AmazonItem>, AdapterError> {
        let url = self.item_search_url(keywords, index, response_group)?;

        self.throttle.wait().await;

        let response: ItemSearchResponse = fetch_xml(Platform::Amazon, self.http.get(url)).await?;
        Ok(response.items.map(|i| i.item).unwrap_or_default())
    }

    async fn search_index(
        &self,
        query: &str,
        index: &str,
    ) -> Result<Vec<AmazonItem>, AdapterError> {
        self.item_search(query, index, SEARCH_RESPONSE_GROUP).await
    }

    async fn fetch_details(&self, asin: &str) -> Result<Option<ItemDetails>, AdapterError> {
        if !self.config.is_configured() {
            return Err(AdapterError::NotConfigured {
                platform: Platform::Amazon,
            });
        }

        let items = self.item_search(asin, "All", DETAILS_RESPONSE_GROUP).await?;
        Ok(items
            .first()
            .and_then(|item| item_to_details(item, self.estimator.as_ref())))
    }

    async fn fetch_all(&self, query: &str, max: usize) -> Result<Vec<KeywordRecord>, AdapterError> {
        if !self.config.is_configured() {
            return Err(AdapterError::NotConfigured {
                platform: Platform::Amazon,
            });
        }

        let per_index = max.div_ceil(SEARCH_INDEXES.len());
        let mut records = Vec::new();

        for index in SEARCH_INDEXES {
            match self.search_index(query, index).await {
                Ok(items) => records.extend(
                    items
                        .iter()
                        .take(per_index)
                        .filter_map(|item| {
                            item_to_record(item, index, query, self.estimator.as_ref())
                        }),
                ),
                Err(e) => {
                    warn!(index, error = %e, "Amazon search index failed, continuing");
                }
            }
        }

        Ok(records)
    }
}

#[async_trait::async_trait]
impl PlatformAdapter for AmazonAdapter {
    fn platform(&self) -> Platform {
        Platform::Amazon
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<KeywordRecord>, AdapterError> {
        cached_search(
            Platform::Amazon,
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

    async fn item_details(&self, asin: &str) -> Result<Option<ItemDetails>, AdapterError> {
        cached_lookup(
            &self.cache,
            &format!("amazon:product:{asin}"),
            DETAILS_CACHE_TTL_SECONDS,
            Option::is_some,
            self.fetch_details(asin),
        )
        .await
    }

    fn features(&self) -> &'static [&'static str] {
        &["product_search", "reviews", "pricing", "categories"]
    }

    fn rate_limit(&self) -> RateLimitInfo {
        RateLimitInfo {
            requests_per_second: 1,
            requests_per_day: 8640,
        }
    }
}

/// Keys and values percent-encoded per RFC 3986, keys in byte order.
fn canonical_query(params: &BTreeMap<&str, &str>) -> String {
    params
        .iter()
        .map(|(key, value)| format!("{}={}", urlencoding::encode(key), urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Base64 HMAC-SHA256 over `GET`, the host, the request path and the
/// canonical query, one per line.
pub(crate) fn generate_signature(
    secret_key: &str,
    host: &str,
    canonical_query: &str,
) -> Result<String, AdapterError> {
    let string_to_sign = format!("GET\n{host}\n{SEARCH_PATH}\n{canonical_query}");

    let mut mac =
        HmacSha256::new_from_slice(secret_key.as_bytes()).map_err(|e| AdapterError::Auth {
            platform: Platform::Amazon,
            message: format!("unusable secret key: {e}"),
        })?;
    mac.update(string_to_sign.as_bytes());

    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

fn estimate_volume(sales_rank: u64, estimator: &dyn VolumeEstimator) -> u64 {
    let (base, spread) = match sales_rank {
        r if r <= 100 => (10_000, 5000),
        r if r <= 1000 => (5000, 3000),
        r if r <= 10_000 => (1000, 2000),
        r if r <= 100_000 => (100, 1000),
        _ => (10, 100),
    };
    jittered(estimator, base, spread)
}

fn competition(item: &AmazonItem) -> Competition {
    let rank = item.sales_rank();
    let priced = item.has_price();

    if rank <= 1000 && priced {
        Competition::High
    } else if rank <= 10_000 && priced {
        Competition::Medium
    } else {
        Competition::Low
    }
}

/// Amazon exposes no trend signal, so this is a weighted coin toss.
fn trend(estimator: &dyn VolumeEstimator) -> Trend {
    match estimator.roll() {
        r if r < 0.3 => Trend::Up,
        r if r < 0.6 => Trend::Stable,
        _ => Trend::Down,
    }
}

pub(crate) fn item_to_record(
    item: &AmazonItem,
    search_index: &str,
    query: &str,
    estimator: &dyn VolumeEstimator,
) -> Option<KeywordRecord> {
    let asin = item.asin.as_deref().filter(|a| !a.is_empty())?;
    let title = item.title()?;

    let volume = estimate_volume(item.sales_rank(), estimator);
    let competition = competition(item);
    let group = item.product_group().unwrap_or(search_index);

    let metrics = KeywordMetrics {
        search_volume: volume,
        trend: trend(estimator),
        competition,
        competition_score: None,
        potential_revenue: scoring::potential_revenue(
            Platform::Amazon,
            volume,
            item.price(),
            competition,
        ),
        cpc: scoring::cpc_exact(&CPC_RATES, group, 1.0),
        difficulty: scoring::difficulty(Platform::Amazon, competition, volume),
    };

    KeywordRecord::new(
        Platform::Amazon,
        asin,
        &scoring::extract_term(query, &[], title),
        metrics,
    )
}

fn item_to_details(item: &AmazonItem, estimator: &dyn VolumeEstimator) -> Option<ItemDetails> {
    let asin = item.asin.as_deref().filter(|a| !a.is_empty())?;
    let title = item.title()?;
    let group = item.product_group().unwrap_or("All");

    Some(ItemDetails {
        platform: Platform::Amazon,
        id: asin.to_string(),
        title: title.to_string(),
        price: item.has_price().then(|| item.price()),
        category: item.product_group().map(str::to_string),
        tags: Vec::new(),
        keyword: item_to_record(item, group, "", estimator),
    })
}

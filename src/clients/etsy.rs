use std::sync::Arc;

use chrono::DateTime;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

use super::estimator::VolumeEstimator;
use super::scoring::{self, jittered};
use super::{
    AdapterDeps, AdapterError, CATALOG_CACHE_TTL_SECONDS, DETAILS_CACHE_TTL_SECONDS,
    DIGITAL_GOODS_SEEDS, PlatformAdapter, RateLimitInfo, Throttle, cached_lookup, cached_search,
    fetch_json, log_page_failure, related_from_search, trending_from_seeds,
};
use crate::cache::CacheService;
use crate::config::EtsyConfig;
use crate::domain::{Competition, Platform, Trend};
use crate::models::{Category, KeywordMetrics, KeywordRecord};

const PAGE_LIMIT: usize = 100;
const OFFSET_CEILING: usize = 1000;

const CPC_RATES: [(&str, f64); 6] = [
    ("jewelry", 0.8),
    ("home & living", 0.6),
    ("art & collectibles", 0.4),
    ("crafts & supplies", 0.3),
    ("clothing", 1.2),
    ("electronics & accessories", 1.5),
];

#[derive(Debug, Deserialize)]
struct ListingsResponse {
    #[serde(default)]
    results: Vec<EtsyListing>,
}

#[derive(Debug, Deserialize)]
struct CategoriesResponse {
    #[serde(default)]
    results: Vec<EtsyCategory>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EtsyCategory {
    pub category_id: Option<u64>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub category_path: Vec<String>,
    #[serde(default)]
    pub children: Vec<EtsyCategory>,
}

/// Depth-first, parents before their children.
fn flatten_categories(categories: &[EtsyCategory], out: &mut Vec<Category>) {
    for category in categories {
        if let Some(id) = category.category_id.filter(|_| !category.name.trim().is_empty()) {
            out.push(Category {
                platform: Platform::Etsy,
                id: id.to_string(),
                name: category.name.trim().to_string(),
                path: category.category_path.clone(),
            });
        }
        flatten_categories(&category.children, out);
    }
}

/// Etsy has returned prices both as decimal strings and as money objects.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum EtsyPrice {
    Money { amount: i64, divisor: i64 },
    Text(String),
    Number(f64),
}

impl EtsyPrice {
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn value(&self) -> f64 {
        match self {
            Self::Money { amount, divisor } if *divisor > 0 => {
                (*amount as f64 / *divisor as f64).max(0.0)
            }
            Self::Money { .. } => 0.0,
            Self::Text(raw) => scoring::parse_price(raw),
            Self::Number(n) if n.is_finite() => n.max(0.0),
            Self::Number(_) => 0.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EtsyListing {
    pub listing_id: Option<u64>,
    pub title: Option<String>,
    pub price: Option<EtsyPrice>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, alias = "taxonomy_path")]
    pub category_path: Vec<String>,
    #[serde(default)]
    pub views: u64,
    #[serde(default)]
    pub num_favorers: u64,
    #[serde(alias = "created_timestamp")]
    pub creation_tsz: Option<i64>,
}

impl EtsyListing {
    #[allow(clippy::cast_precision_loss)]
    fn engagement(&self) -> f64 {
        self.num_favorers as f64 / self.views.max(1) as f64
    }

    fn price(&self) -> f64 {
        self.price.as_ref().map_or(0.0, EtsyPrice::value)
    }
}

pub struct EtsyAdapter {
    config: EtsyConfig,
    http: Client,
    cache: CacheService,
    estimator: Arc<dyn VolumeEstimator>,
    throttle: Throttle,
}

impl EtsyAdapter {
    #[must_use]
    pub fn new(config: EtsyConfig, deps: AdapterDeps) -> Self {
        Self {
            throttle: Throttle::from_millis(config.rate_limit_ms),
            config,
            http: deps.http,
            cache: deps.cache,
            estimator: deps.estimator,
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, AdapterError> {
        Ok(Url::parse(&format!(
            "{}{path}",
            self.config.base_url.trim_end_matches('/')
        ))?)
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, AdapterError> {
        self.throttle.wait().await;

        let request = self
            .http
            .get(url)
            .header("x-api-key", &self.config.api_key);
        fetch_json(Platform::Etsy, request).await
    }

    fn ensure_configured(&self) -> Result<(), AdapterError> {
        if self.config.is_configured() {
            Ok(())
        } else {
            Err(AdapterError::NotConfigured {
                platform: Platform::Etsy,
            })
        }
    }

    async fn fetch_page(
        &self,
        query: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<EtsyListing>, AdapterError> {
        let mut url = self.endpoint("/application/listings/active")?;
        url.query_pairs_mut()
            .append_pair("keywords", query)
            .append_pair("limit", &limit.to_string())
            .append_pair("offset", &offset.to_string())
            .append_pair("sort_on", "score")
            .append_pair("sort_order", "desc");

        let response: ListingsResponse = self.get(url).await?;
        Ok(response.results)
    }

    async fn fetch_categories(&self) -> Result<Vec<Category>, AdapterError> {
        self.ensure_configured()?;

        let url = self.endpoint("/application/shops/active/categories")?;
        let response: CategoriesResponse = self.get(url).await?;

        let mut categories = Vec::new();
        flatten_categories(&response.results, &mut categories);
        Ok(categories)
    }

    async fn fetch_shop_listings(
        &self,
        shop_id: &str,
        limit: usize,
    ) -> Result<Vec<KeywordRecord>, AdapterError> {
        self.ensure_configured()?;

        let mut url = self.endpoint(&format!(
            "/application/shops/{}/listings/active",
            urlencoding::encode(shop_id)
        ))?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.min(PAGE_LIMIT).to_string())
            .append_pair("includes", "Images");

        let response: ListingsResponse = self.get(url).await?;
        Ok(response
            .results
            .iter()
            .filter_map(|l| listing_to_record(l, "", self.estimator.as_ref()))
            .collect())
    }

    async fn fetch_all(&self, query: &str, max: usize) -> Result<Vec<KeywordRecord>, AdapterError> {
        self.ensure_configured()?;

        let limit = PAGE_LIMIT.min(max);
        let mut offset = 0;
        let mut records = Vec::new();

        while records.len() < max && offset < OFFSET_CEILING {
            let page = match self.fetch_page(query, limit, offset).await {
                Ok(page) => page,
                Err(e) => {
                    log_page_failure(Platform::Etsy, offset, &e);
                    break;
                }
            };

            if page.is_empty() {
                break;
            }
            let short_page = page.len() < limit;

            records.extend(
                page.iter()
                    .filter_map(|l| listing_to_record(l, query, self.estimator.as_ref())),
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
impl PlatformAdapter for EtsyAdapter {
    fn platform(&self) -> Platform {
        Platform::Etsy
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<KeywordRecord>, AdapterError> {
        cached_search(
            Platform::Etsy,
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
        Ok(trending_from_seeds(self, &self.cache, &DIGITAL_GOODS_SEEDS, category).await)
    }

    fn supports_trending(&self) -> bool {
        true
    }

    async fn categories(&self) -> Result<Vec<Category>, AdapterError> {
        cached_lookup(
            &self.cache,
            "etsy:categories",
            CATALOG_CACHE_TTL_SECONDS,
            |c: &Vec<Category>| !c.is_empty(),
            self.fetch_categories(),
        )
        .await
    }

    async fn group_listings(
        &self,
        shop_id: &str,
        limit: usize,
    ) -> Result<Vec<KeywordRecord>, AdapterError> {
        cached_lookup(
            &self.cache,
            &format!("etsy:shop:{shop_id}:{limit}"),
            DETAILS_CACHE_TTL_SECONDS,
            |l: &Vec<KeywordRecord>| !l.is_empty(),
            self.fetch_shop_listings(shop_id, limit),
        )
        .await
    }

    fn features(&self) -> &'static [&'static str] {
        &["listings", "shops", "categories", "tags"]
    }

    fn rate_limit(&self) -> RateLimitInfo {
        RateLimitInfo {
            requests_per_second: 10,
            requests_per_day: 10_000,
        }
    }
}

fn estimate_volume(listing: &EtsyListing, estimator: &dyn VolumeEstimator) -> u64 {
    let views = listing.views;
    let engagement = listing.engagement();

    let (base, spread) = if views > 10_000 && engagement > 0.1 {
        (5000, 5000)
    } else if views > 5000 && engagement > 0.05 {
        (2000, 3000)
    } else if views > 1000 && engagement > 0.02 {
        (500, 2000)
    } else if views > 100 {
        (100, 500)
    } else {
        (10, 100)
    };
    jittered(estimator, base, spread)
}

fn competition(listing: &EtsyListing) -> Competition {
    let price = listing.price();
    let engagement = listing.engagement();

    if price > 50.0 && engagement > 0.1 {
        Competition::High
    } else if price > 20.0 && engagement > 0.05 {
        Competition::Medium
    } else {
        Competition::Low
    }
}

fn trend(volume: u64, created: Option<i64>) -> Trend {
    let age = created
        .and_then(|ts| DateTime::from_timestamp(ts, 0))
        .map_or(i64::MAX, scoring::age_in_days);

    if age < 30 && volume > 1000 {
        Trend::Up
    } else if age < 90 && volume > 500 {
        Trend::Stable
    } else {
        Trend::Down
    }
}

/// Maps one listing onto a keyword record. Listings without an id or
/// title are dropped.
pub(crate) fn listing_to_record(
    listing: &EtsyListing,
    query: &str,
    estimator: &dyn VolumeEstimator,
) -> Option<KeywordRecord> {
    let id = listing.listing_id?;
    let title = html_escape::decode_html_entities(listing.title.as_deref()?).into_owned();
    if title.trim().is_empty() {
        return None;
    }

    let volume = estimate_volume(listing, estimator);
    let competition = competition(listing);
    let category = listing.category_path.first().map_or("", String::as_str);

    let metrics = KeywordMetrics {
        search_volume: volume,
        trend: trend(volume, listing.creation_tsz),
        competition,
        competition_score: None,
        potential_revenue: scoring::potential_revenue(
            Platform::Etsy,
            volume,
            listing.price(),
            competition,
        ),
        cpc: scoring::cpc_exact(&CPC_RATES, category, 0.5),
        difficulty: scoring::difficulty(Platform::Etsy, competition, volume),
    };

    KeywordRecord::new(
        Platform::Etsy,
        &id.to_string(),
        &scoring::extract_term(query, &listing.tags, &title),
        metrics,
    )
}

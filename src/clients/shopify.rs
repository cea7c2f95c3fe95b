use std::sync::Arc;

use chrono::{DateTime, Utc};
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
use crate::config::ShopifyConfig;
use crate::domain::{Competition, Platform, Trend};
use crate::models::{Category, ItemDetails, KeywordMetrics, KeywordRecord};

const PAGE_LIMIT: usize = 250;

const PRODUCT_FIELDS: &str = "id,title,product_type,tags,variants,created_at,updated_at";

const CPC_RATES: [(&str, f64); 9] = [
    ("clothing", 1.5),
    ("accessories", 1.2),
    ("home & garden", 1.0),
    ("electronics", 2.0),
    ("beauty", 1.8),
    ("health", 1.5),
    ("sports", 1.3),
    ("toys", 1.0),
    ("books", 0.8),
];

#[derive(Debug, Deserialize)]
struct ProductsResponse {
    #[serde(default)]
    products: Vec<ShopifyProduct>,
}

#[derive(Debug, Deserialize)]
struct ProductResponse {
    product: Option<ShopifyProduct>,
}

#[derive(Debug, Deserialize)]
struct CollectionsResponse {
    #[serde(default)]
    collections: Vec<ShopifyCollection>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShopifyCollection {
    pub id: Option<u64>,
    #[serde(default)]
    pub handle: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShopifyVariant {
    #[serde(default)]
    pub price: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShopifyProduct {
    pub id: Option<u64>,
    pub title: Option<String>,
    #[serde(default)]
    pub product_type: String,
    /// Comma separated.
    #[serde(default)]
    pub tags: String,
    #[serde(default)]
    pub variants: Vec<ShopifyVariant>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl ShopifyProduct {
    fn tag_list(&self) -> Vec<String> {
        self.tags
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
            .collect()
    }

    fn variant_count(&self) -> usize {
        self.variants.len().max(1)
    }

    /// Cheapest variant price.
    fn price(&self) -> f64 {
        self.variants
            .iter()
            .filter_map(|v| v.price.as_deref())
            .filter_map(|p| p.trim().parse::<f64>().ok())
            .filter(|p| p.is_finite() && *p >= 0.0)
            .reduce(f64::min)
            .unwrap_or(0.0)
    }
}

fn days_since(raw: Option<&str>) -> i64 {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map_or(i64::MAX, |dt| scoring::age_in_days(dt.with_timezone(&Utc)))
}

pub struct ShopifyAdapter {
    config: ShopifyConfig,
    http: Client,
    cache: CacheService,
    estimator: Arc<dyn VolumeEstimator>,
    throttle: Throttle,
}

impl ShopifyAdapter {
    #[must_use]
    pub fn new(config: ShopifyConfig, deps: AdapterDeps) -> Self {
        Self {
            throttle: Throttle::from_millis(config.rate_limit_ms),
            config,
            http: deps.http,
            cache: deps.cache,
            estimator: deps.estimator,
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, AdapterError> {
        Ok(Url::parse(&format!("{}{path}", self.config.api_base()))?)
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, AdapterError> {
        self.throttle.wait().await;

        let request = self
            .http
            .get(url)
            .header("X-Shopify-Access-Token", &self.config.access_token);
        fetch_json(Platform::Shopify, request).await
    }

    fn ensure_configured(&self) -> Result<(), AdapterError> {
        if self.config.is_configured() {
            Ok(())
        } else {
            Err(AdapterError::NotConfigured {
                platform: Platform::Shopify,
            })
        }
    }

    async fn fetch_page(
        &self,
        query: &str,
        limit: usize,
        page: usize,
    ) -> Result<Vec<ShopifyProduct>, AdapterError> {
        let mut url = self.endpoint("/products.json")?;
        url.query_pairs_mut()
            .append_pair("title", query)
            .append_pair("limit", &limit.to_string())
            .append_pair("page", &page.to_string())
            .append_pair("fields", PRODUCT_FIELDS);

        let response: ProductsResponse = self.get(url).await?;
        Ok(response.products)
    }

    async fn fetch_collections(&self) -> Result<Vec<Category>, AdapterError> {
        self.ensure_configured()?;

        let response: CollectionsResponse = self.get(self.endpoint("/collections.json")?).await?;
        Ok(response
            .collections
            .into_iter()
            .filter_map(|c| {
                let id = c.id?;
                let name = if c.title.trim().is_empty() {
                    c.handle
                } else {
                    c.title
                };
                (!name.trim().is_empty()).then(|| Category {
                    platform: Platform::Shopify,
                    id: id.to_string(),
                    name,
                    path: Vec::new(),
                })
            })
            .collect())
    }

    async fn fetch_collection_products(
        &self,
        collection_id: &str,
        limit: usize,
    ) -> Result<Vec<KeywordRecord>, AdapterError> {
        self.ensure_configured()?;

        let mut url = self.endpoint(&format!(
            "/collections/{}/products.json",
            urlencoding::encode(collection_id)
        ))?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.min(PAGE_LIMIT).to_string())
            .append_pair("fields", PRODUCT_FIELDS);

        let response: ProductsResponse = self.get(url).await?;
        Ok(response
            .products
            .iter()
            .filter_map(|p| product_to_record(p, "", self.estimator.as_ref()))
            .collect())
    }

    async fn fetch_product(&self, product_id: &str) -> Result<Option<ItemDetails>, AdapterError> {
        self.ensure_configured()?;

        let url = self.endpoint(&format!(
            "/products/{}.json",
            urlencoding::encode(product_id)
        ))?;
        let response: ProductResponse = match self.get(url).await {
            Ok(response) => response,
            Err(AdapterError::Status { status: 404, .. }) => return Ok(None),
            Err(e) => return Err(e),
        };

        Ok(response
            .product
            .and_then(|p| product_to_details(&p, self.estimator.as_ref())))
    }

    async fn fetch_all(&self, query: &str, max: usize) -> Result<Vec<KeywordRecord>, AdapterError> {
        self.ensure_configured()?;

        let limit = PAGE_LIMIT.min(max).max(1);
        let max_pages = max.div_ceil(limit);
        let mut page = 1;
        let mut records = Vec::new();

        while records.len() < max && page <= max_pages {
            let products = match self.fetch_page(query, limit, page).await {
                Ok(products) => products,
                Err(e) => {
                    log_page_failure(Platform::Shopify, page, &e);
                    break;
                }
            };

            if products.is_empty() {
                break;
            }
            let short_page = products.len() < limit;

            records.extend(
                products
                    .iter()
                    .filter_map(|p| product_to_record(p, query, self.estimator.as_ref())),
            );

            if short_page {
                break;
            }
            page += 1;
        }

        Ok(records)
    }
}

#[async_trait::async_trait]
impl PlatformAdapter for ShopifyAdapter {
    fn platform(&self) -> Platform {
        Platform::Shopify
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<KeywordRecord>, AdapterError> {
        cached_search(
            Platform::Shopify,
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
            "shopify:collections",
            CATALOG_CACHE_TTL_SECONDS,
            |c: &Vec<Category>| !c.is_empty(),
            self.fetch_collections(),
        )
        .await
    }

    async fn item_details(&self, product_id: &str) -> Result<Option<ItemDetails>, AdapterError> {
        cached_lookup(
            &self.cache,
            &format!("shopify:product:{product_id}"),
            DETAILS_CACHE_TTL_SECONDS,
            Option::is_some,
            self.fetch_product(product_id),
        )
        .await
    }

    async fn group_listings(
        &self,
        collection_id: &str,
        limit: usize,
    ) -> Result<Vec<KeywordRecord>, AdapterError> {
        cached_lookup(
            &self.cache,
            &format!("shopify:collection:{collection_id}:{limit}"),
            DETAILS_CACHE_TTL_SECONDS,
            |l: &Vec<KeywordRecord>| !l.is_empty(),
            self.fetch_collection_products(collection_id, limit),
        )
        .await
    }

    fn features(&self) -> &'static [&'static str] {
        &["products", "collections", "variants", "inventory"]
    }

    fn rate_limit(&self) -> RateLimitInfo {
        RateLimitInfo {
            requests_per_second: 2,
            requests_per_day: 10_000,
        }
    }
}

fn estimate_volume(product: &ShopifyProduct, estimator: &dyn VolumeEstimator) -> u64 {
    let age = days_since(product.created_at.as_deref());
    let variants = product.variant_count();
    let tags = product.tag_list().len();

    let mut base = 100;
    base += match age {
        a if a < 30 => 2000,
        a if a < 90 => 1000,
        a if a < 365 => 500,
        _ => 0,
    };
    base += match variants {
        v if v > 5 => 1000,
        v if v > 2 => 500,
        _ => 0,
    };
    base += match tags {
        t if t > 10 => 500,
        t if t > 5 => 200,
        _ => 0,
    };

    jittered(estimator, base, base)
}

fn competition(product: &ShopifyProduct) -> Competition {
    let price = product.price();
    let variants = product.variant_count();
    let tags = product.tag_list().len();

    if price > 100.0 && variants > 3 && tags > 5 {
        Competition::High
    } else if price > 50.0 && (variants > 2 || tags > 3) {
        Competition::Medium
    } else {
        Competition::Low
    }
}

fn trend(product: &ShopifyProduct) -> Trend {
    let age = days_since(product.created_at.as_deref());
    let since_update = days_since(product.updated_at.as_deref());

    if age < 30 && since_update < 7 {
        Trend::Up
    } else if age < 90 && since_update < 30 {
        Trend::Stable
    } else {
        Trend::Down
    }
}

pub(crate) fn product_to_record(
    product: &ShopifyProduct,
    query: &str,
    estimator: &dyn VolumeEstimator,
) -> Option<KeywordRecord> {
    let id = product.id?;
    let title = product.title.as_deref().filter(|t| !t.trim().is_empty())?;

    let volume = estimate_volume(product, estimator);
    let competition = competition(product);

    let metrics = KeywordMetrics {
        search_volume: volume,
        trend: trend(product),
        competition,
        competition_score: None,
        potential_revenue: scoring::potential_revenue(
            Platform::Shopify,
            volume,
            product.price(),
            competition,
        ),
        cpc: scoring::cpc_containing(&CPC_RATES, &product.product_type, 1.2),
        difficulty: scoring::difficulty(Platform::Shopify, competition, volume),
    };

    KeywordRecord::new(
        Platform::Shopify,
        &id.to_string(),
        &scoring::extract_term(query, &product.tag_list(), title),
        metrics,
    )
}

fn product_to_details(
    product: &ShopifyProduct,
    estimator: &dyn VolumeEstimator,
) -> Option<ItemDetails> {
    let id = product.id?;
    let title = product.title.as_deref().filter(|t| !t.trim().is_empty())?;

    Some(ItemDetails {
        platform: Platform::Shopify,
        id: id.to_string(),
        title: title.to_string(),
        price: (!product.variants.is_empty()).then(|| product.price()),
        category: Some(product.product_type.clone()).filter(|t| !t.is_empty()),
        tags: product.tag_list(),
        keyword: product_to_record(product, "", estimator),
    })
}

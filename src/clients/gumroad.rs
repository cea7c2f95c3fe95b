use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use super::estimator::VolumeEstimator;
use super::scoring::{self, jittered};
use super::{
    AdapterDeps, AdapterError, PlatformAdapter, RateLimitInfo, Throttle, cached_search,
    fetch_json, log_page_failure, related_from_search,
};
use crate::cache::CacheService;
use crate::config::GumroadConfig;
use crate::domain::{Competition, Platform, Trend};
use crate::models::{KeywordMetrics, KeywordRecord};

const PAGE_LIMIT: usize = 50;
const MAX_PAGES: usize = 10;

const CPC_RATES: [(&str, f64); 6] = [
    ("software", 2.0),
    ("design", 1.5),
    ("writing", 1.0),
    ("music", 1.2),
    ("video", 1.8),
    ("photography", 1.3),
];

#[derive(Debug, Deserialize)]
struct ProductsResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    products: Vec<GumroadProduct>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GumroadProduct {
    pub id: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub category: String,
    pub created_at: Option<String>,
    #[serde(default)]
    pub sales_count: u64,
    #[serde(default)]
    pub view_count: u64,
    #[serde(default)]
    pub like_count: u64,
}

impl GumroadProduct {
    fn price(&self) -> f64 {
        if self.price.is_finite() {
            self.price.max(0.0)
        } else {
            0.0
        }
    }

    fn age_in_days(&self) -> i64 {
        self.created_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map_or(i64::MAX, |dt| scoring::age_in_days(dt.with_timezone(&Utc)))
    }
}

pub struct GumroadAdapter {
    config: GumroadConfig,
    http: Client,
    cache: CacheService,
    estimator: Arc<dyn VolumeEstimator>,
    throttle: Throttle,
}

impl GumroadAdapter {
    #[must_use]
    pub fn new(config: GumroadConfig, deps: AdapterDeps) -> Self {
        Self {
            throttle: Throttle::from_millis(config.rate_limit_ms),
            config,
            http: deps.http,
            cache: deps.cache,
            estimator: deps.estimator,
        }
    }

    async fn fetch_page(
        &self,
        query: &str,
        limit: usize,
        page: usize,
    ) -> Result<ProductsResponse, AdapterError> {
        let mut url = Url::parse(&format!(
            "{}/products",
            self.config.base_url.trim_end_matches('/')
        ))?;
        url.query_pairs_mut()
            .append_pair("query", query)
            .append_pair("limit", &limit.to_string())
            .append_pair("page", &page.to_string());

        self.throttle.wait().await;

        let request = self.http.get(url).bearer_auth(&self.config.access_token);
        fetch_json(Platform::Gumroad, request).await
    }

    async fn fetch_all(&self, query: &str, max: usize) -> Result<Vec<KeywordRecord>, AdapterError> {
        if !self.config.is_configured() {
            return Err(AdapterError::NotConfigured {
                platform: Platform::Gumroad,
            });
        }

        let limit = PAGE_LIMIT.min(max);
        let mut page = 1;
        let mut records = Vec::new();

        while records.len() < max && page <= MAX_PAGES {
            let response = match self.fetch_page(query, limit, page).await {
                Ok(response) => response,
                Err(e) => {
                    log_page_failure(Platform::Gumroad, page, &e);
                    break;
                }
            };

            if !response.success {
                debug!(page, "Gumroad reported an unsuccessful page");
                break;
            }
            if response.products.is_empty() {
                break;
            }
            let short_page = response.products.len() < limit;

            records.extend(
                response
                    .products
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
impl PlatformAdapter for GumroadAdapter {
    fn platform(&self) -> Platform {
        Platform::Gumroad
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<KeywordRecord>, AdapterError> {
        cached_search(
            Platform::Gumroad,
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

    fn features(&self) -> &'static [&'static str] {
        &["digital_products", "downloads", "analytics", "payments"]
    }

    fn rate_limit(&self) -> RateLimitInfo {
        RateLimitInfo {
            requests_per_second: 1,
            requests_per_day: 1000,
        }
    }
}

fn estimate_volume(product: &GumroadProduct, estimator: &dyn VolumeEstimator) -> u64 {
    let mut base = 100;
    base += match product.sales_count {
        s if s > 100 => 2000,
        s if s > 50 => 1000,
        s if s > 10 => 500,
        _ => 0,
    };
    base += match product.view_count {
        v if v > 1000 => 1000,
        v if v > 500 => 500,
        _ => 0,
    };
    base += match product.like_count {
        l if l > 50 => 500,
        l if l > 20 => 200,
        _ => 0,
    };

    jittered(estimator, base, base)
}

fn competition(product: &GumroadProduct) -> Competition {
    let price = product.price();
    let sales = product.sales_count;
    let tags = product.tags.len();

    if price > 50.0 && sales > 20 && tags > 5 {
        Competition::High
    } else if price > 20.0 && (sales > 5 || tags > 3) {
        Competition::Medium
    } else {
        Competition::Low
    }
}

fn trend(volume: u64, age_in_days: i64) -> Trend {
    if age_in_days < 30 && volume > 1000 {
        Trend::Up
    } else if age_in_days < 90 && volume > 500 {
        Trend::Stable
    } else {
        Trend::Down
    }
}

pub(crate) fn product_to_record(
    product: &GumroadProduct,
    query: &str,
    estimator: &dyn VolumeEstimator,
) -> Option<KeywordRecord> {
    let id = product.id.as_deref().filter(|id| !id.is_empty())?;
    let name = product.name.as_deref().filter(|n| !n.trim().is_empty())?;

    let volume = estimate_volume(product, estimator);
    let competition = competition(product);

    let metrics = KeywordMetrics {
        search_volume: volume,
        trend: trend(volume, product.age_in_days()),
        competition,
        competition_score: None,
        potential_revenue: scoring::potential_revenue(
            Platform::Gumroad,
            volume,
            product.price(),
            competition,
        ),
        cpc: scoring::cpc_exact(&CPC_RATES, &product.category, 1.0),
        difficulty: scoring::difficulty(Platform::Gumroad, competition, volume),
    };

    KeywordRecord::new(
        Platform::Gumroad,
        id,
        &scoring::extract_term(query, &product.tags, name),
        metrics,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::FixedEstimator;
    use crate::clients::test_support::deps;

    #[test]
    fn best_seller_maps_to_record() {
        let p: GumroadProduct = serde_json::from_value(serde_json::json!({
            "id": "A-m3CDDC5dlrSdKZp0RFhA==",
            "name": "Notion Budget Tracker",
            "price": 25.0,
            "tags": ["notion", "budget", "finance", "spreadsheet"],
            "category": "Software",
            "created_at": (Utc::now() - chrono::Duration::days(10)).to_rfc3339(),
            "sales_count": 150,
            "view_count": 4000,
            "like_count": 30
        }))
        .unwrap();

        let record = product_to_record(&p, "budget tracker", &FixedEstimator::default()).unwrap();
        assert_eq!(record.id, "gumroad-A-m3CDDC5dlrSdKZp0RFhA==");
        assert_eq!(record.term, "budget");
        // 100 + 2000 + 1000 + 200
        assert_eq!(record.search_volume, 3300);
        assert_eq!(record.competition, Competition::Medium);
        assert_eq!(record.trend, Trend::Up);
        assert!((record.cpc - 2.0).abs() < f64::EPSILON);
        // 30 + 15 + 20
        assert_eq!(record.difficulty.value(), 65);
        // 3300 * 0.06 * 25
        assert!((record.potential_revenue - 4950.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn gumroad_has_no_trending() {
        let adapter = GumroadAdapter::new(GumroadConfig::default(), deps());
        assert!(!adapter.supports_trending());
        assert!(adapter.trending(None).await.unwrap().is_empty());
        assert!(matches!(
            adapter.search("ebook", 5).await,
            Err(AdapterError::NotConfigured { .. })
        ));
    }
}

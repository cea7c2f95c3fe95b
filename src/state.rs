use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::cache::{CacheService, RedisStore};
use crate::clients::{
    AdapterDeps, AmazonAdapter, EbayAdapter, EtsyAdapter, GumroadAdapter, PlatformAdapter,
    RandomEstimator, ShopifyAdapter, VolumeEstimator, build_http_client,
};
use crate::config::{CacheBackend, CacheConfig, Config};
use crate::domain::Platform;
use crate::services::{
    AggregationService, AggregationSettings, FavoriteStore, KeywordService, SearchHistory,
};

pub type AdapterMap = HashMap<Platform, Arc<dyn PlatformAdapter>>;

#[derive(Clone)]
pub struct SharedState {
    pub config: Arc<RwLock<Config>>,

    pub cache: CacheService,

    pub keywords: Arc<dyn KeywordService>,

    pub history: Arc<SearchHistory>,

    pub favorites: Arc<FavoriteStore>,
}

impl SharedState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let cache = build_cache(&config.cache).await;

        // One pooled client for every marketplace.
        let http = build_http_client(
            config.general.http_timeout_seconds,
            &config.general.user_agent,
        )?;

        let estimator: Arc<dyn VolumeEstimator> = Arc::new(RandomEstimator);
        let deps = AdapterDeps {
            http,
            cache: cache.clone(),
            estimator: estimator.clone(),
        };
        let adapters = build_adapters(&config, &deps);

        Ok(Self::with_adapters(config, cache, adapters, estimator))
    }

    /// Wires the services around an explicit adapter set.
    #[must_use]
    pub fn with_adapters(
        config: Config,
        cache: CacheService,
        adapters: AdapterMap,
        estimator: Arc<dyn VolumeEstimator>,
    ) -> Self {
        let settings = AggregationSettings::from_config(&config);
        let history = Arc::new(SearchHistory::new(config.search.history_limit));
        let favorites = Arc::new(FavoriteStore::new(config.search.favorites_limit));

        let keywords: Arc<dyn KeywordService> = Arc::new(AggregationService::new(
            adapters,
            cache.clone(),
            settings,
            estimator,
        ));

        Self {
            config: Arc::new(RwLock::new(config)),
            cache,
            keywords,
            history,
            favorites,
        }
    }
}

/// Connects the configured cache backend. A Redis connection failure falls
/// back to the in-memory store.
pub async fn build_cache(config: &CacheConfig) -> CacheService {
    match config.backend {
        CacheBackend::Memory => CacheService::in_memory(),
        CacheBackend::Redis => match RedisStore::connect(&config.redis_url).await {
            Ok(store) => CacheService::new(Arc::new(store)),
            Err(e) => {
                warn!(error = %e, "Redis unavailable, using in-memory cache");
                CacheService::in_memory()
            }
        },
    }
}

/// Builds an adapter for every enabled platform.
#[must_use]
pub fn build_adapters(config: &Config, deps: &AdapterDeps) -> AdapterMap {
    let mut adapters: AdapterMap = HashMap::new();

    if config.amazon.enabled {
        adapters.insert(
            Platform::Amazon,
            Arc::new(AmazonAdapter::new(config.amazon.clone(), deps.clone())),
        );
    }
    if config.etsy.enabled {
        adapters.insert(
            Platform::Etsy,
            Arc::new(EtsyAdapter::new(config.etsy.clone(), deps.clone())),
        );
    }
    if config.ebay.enabled {
        adapters.insert(
            Platform::Ebay,
            Arc::new(EbayAdapter::new(config.ebay.clone(), deps.clone())),
        );
    }
    if config.shopify.enabled {
        adapters.insert(
            Platform::Shopify,
            Arc::new(ShopifyAdapter::new(config.shopify.clone(), deps.clone())),
        );
    }
    if config.gumroad.enabled {
        adapters.insert(
            Platform::Gumroad,
            Arc::new(GumroadAdapter::new(config.gumroad.clone(), deps.clone())),
        );
    }

    for platform in Platform::ALL {
        if !adapters.contains_key(&platform) {
            info!(%platform, "Platform disabled in config");
        }
    }

    adapters
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::FixedEstimator;

    fn deps() -> AdapterDeps {
        AdapterDeps {
            http: reqwest::Client::new(),
            cache: CacheService::in_memory(),
            estimator: Arc::new(FixedEstimator::default()),
        }
    }

    #[test]
    fn only_enabled_platforms_get_adapters() {
        let mut config = Config::default();
        config.amazon.enabled = false;
        config.shopify.enabled = false;

        let adapters = build_adapters(&config, &deps());
        let mut platforms: Vec<_> = adapters.keys().copied().collect();
        platforms.sort();
        assert_eq!(
            platforms,
            vec![Platform::Etsy, Platform::Ebay, Platform::Gumroad]
        );
        assert_eq!(adapters[&Platform::Etsy].platform(), Platform::Etsy);
    }

    #[tokio::test]
    async fn unreachable_redis_falls_back_to_memory() {
        let config = CacheConfig {
            backend: CacheBackend::Redis,
            redis_url: "redis://127.0.0.1:1/".to_string(),
            ..CacheConfig::default()
        };
        let cache = build_cache(&config).await;
        assert_eq!(cache.backend(), "memory");
    }
}

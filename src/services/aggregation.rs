use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, info, warn};

use super::keyword_service::{KeywordService, PlatformStats, PlatformStatus, SearchError};
use crate::cache::CacheService;
use crate::clients::{PlatformAdapter, VolumeEstimator, scoring};
use crate::config::Config;
use crate::domain::{Competition, Difficulty, Platform, Trend, normalize_term};
use crate::models::{
    AggregatedSearchResult, BulkAnalysis, BulkKeywordResult, Category, ItemDetails,
    KeywordMetrics, KeywordRecord, PlatformSelection, SearchOptions, TrendSummary,
};

/// Related placeholders appended to one search result.
const RELATED_PLACEHOLDER_LIMIT: usize = 20;
const TRENDING_LIMIT: usize = 50;
const STATS_CACHE_KEY: &str = "platform:stats";
const HEALTH_PROBE_QUERY: &str = "test";

/// Most keywords one bulk analysis accepts.
pub const MAX_BULK_KEYWORDS: usize = 50;

/// Limits and cache lifetimes for [`AggregationService`].
#[derive(Debug, Clone)]
pub struct AggregationSettings {
    pub max_results_cap: usize,
    pub default_ttl_seconds: u64,
    pub related_ttl_seconds: u64,
    pub trending_ttl_seconds: u64,
    pub stats_ttl_seconds: u64,
    pub timeout: Duration,
}

impl Default for AggregationSettings {
    fn default() -> Self {
        Self {
            max_results_cap: 100,
            default_ttl_seconds: 3600,
            related_ttl_seconds: 1800,
            trending_ttl_seconds: 3600,
            stats_ttl_seconds: 300,
            timeout: Duration::from_secs(30),
        }
    }
}

impl AggregationSettings {
    #[must_use]
    pub const fn from_config(config: &Config) -> Self {
        Self {
            max_results_cap: config.search.max_results_cap,
            default_ttl_seconds: config.cache.default_ttl_seconds,
            related_ttl_seconds: config.search.related_cache_ttl_seconds,
            trending_ttl_seconds: config.search.trending_cache_ttl_seconds,
            stats_ttl_seconds: config.search.stats_cache_ttl_seconds,
            timeout: Duration::from_secs(config.search.timeout_seconds),
        }
    }
}

type Target = (Platform, Arc<dyn PlatformAdapter>);

/// Fans keyword requests out to the registered marketplace adapters.
pub struct AggregationService {
    adapters: HashMap<Platform, Arc<dyn PlatformAdapter>>,
    cache: CacheService,
    settings: AggregationSettings,
    estimator: Arc<dyn VolumeEstimator>,
}

impl AggregationService {
    #[must_use]
    pub fn new(
        adapters: HashMap<Platform, Arc<dyn PlatformAdapter>>,
        cache: CacheService,
        settings: AggregationSettings,
        estimator: Arc<dyn VolumeEstimator>,
    ) -> Self {
        Self {
            adapters,
            cache,
            settings,
            estimator,
        }
    }

    fn adapter(&self, platform: Platform) -> Result<&Arc<dyn PlatformAdapter>, SearchError> {
        self.adapters
            .get(&platform)
            .ok_or(SearchError::PlatformUnavailable(platform))
    }

    /// Adapters for `platforms` in the given order. Platforms without an
    /// adapter are skipped.
    fn targets(&self, platforms: &[Platform]) -> Vec<Target> {
        platforms
            .iter()
            .filter_map(|platform| {
                if let Some(adapter) = self.adapters.get(platform) {
                    Some((*platform, Arc::clone(adapter)))
                } else {
                    warn!(%platform, "No adapter registered for platform, skipping");
                    None
                }
            })
            .collect()
    }

    async fn fan_out_search(
        &self,
        query: &str,
        targets: &[Target],
        max_results: usize,
    ) -> Vec<KeywordRecord> {
        let searches = targets.iter().map(|(platform, adapter)| async move {
            match adapter.search(query, max_results).await {
                Ok(records) => {
                    debug!(%platform, found = records.len(), "Platform search finished");
                    records
                }
                Err(e) => {
                    warn!(%platform, error = %e, "Platform search failed");
                    metrics::counter!("adapter_failures_total", "platform" => platform.as_str())
                        .increment(1);
                    Vec::new()
                }
            }
        });

        join_all(searches).await.into_iter().flatten().collect()
    }

    async fn collect_related(&self, query: &str, targets: &[Target]) -> Vec<KeywordRecord> {
        let lookups = targets.iter().map(|(platform, adapter)| async move {
            match adapter.related_keywords(query).await {
                Ok(terms) => terms
                    .into_iter()
                    .map(|term| (*platform, term))
                    .collect::<Vec<_>>(),
                Err(e) => {
                    warn!(%platform, error = %e, "Related keyword lookup failed");
                    Vec::new()
                }
            }
        });

        let mut seen = HashSet::new();
        let mut related = Vec::new();

        for (platform, term) in join_all(lookups).await.into_iter().flatten() {
            if related.len() == RELATED_PLACEHOLDER_LIMIT {
                break;
            }
            if !seen.insert(term.to_lowercase()) {
                continue;
            }
            if let Some(record) = related_placeholder(platform, &term, self.estimator.as_ref()) {
                related.push(record);
            }
        }

        related
    }

    async fn run_search(
        &self,
        query: &str,
        key: &str,
        options: &SearchOptions,
        max_results: usize,
        started: Instant,
    ) -> AggregatedSearchResult {
        if let Some(mut hit) = self.cache.get_json::<AggregatedSearchResult>(key).await {
            info!(query, "Aggregated search cache hit");
            metrics::counter!("keyword_cache_hits_total").increment(1);
            hit.cached = true;
            hit.search_time_ms = elapsed_ms(started);
            hit.trend_summary = options
                .include_trends
                .then(|| TrendSummary::from_keywords(&hit.keywords));
            return hit;
        }

        let targets = self.targets(&options.platforms.resolve());
        let platforms: Vec<Platform> = targets.iter().map(|(p, _)| *p).collect();
        info!(query, ?platforms, max_results, "Starting keyword search");

        let mut keywords = self.fan_out_search(query, &targets, max_results).await;
        keywords.sort_by(|a, b| b.composite_score().total_cmp(&a.composite_score()));
        keywords.truncate(max_results);

        if options.include_related {
            let present: HashSet<String> = keywords.iter().map(|k| k.term.to_lowercase()).collect();
            let related: Vec<KeywordRecord> = self
                .related_keywords(query, &options.platforms)
                .await
                .into_iter()
                .filter(|r| !present.contains(&r.term.to_lowercase()))
                .take(RELATED_PLACEHOLDER_LIMIT)
                .collect();
            keywords.extend(related);
        }

        let trend_summary = options
            .include_trends
            .then(|| TrendSummary::from_keywords(&keywords));

        let result = AggregatedSearchResult {
            total_results: keywords.len(),
            keywords,
            platforms,
            search_time_ms: elapsed_ms(started),
            cached: false,
            trend_summary,
        };

        let ttl = options
            .cache_ttl_seconds
            .unwrap_or(self.settings.default_ttl_seconds);
        self.cache.set_json(key, &result, ttl).await;

        info!(
            query,
            total_results = result.total_results,
            search_time_ms = result.search_time_ms,
            "Keyword search completed"
        );
        result
    }
}

#[async_trait::async_trait]
impl KeywordService for AggregationService {
    async fn search_keywords(
        &self,
        query: &str,
        options: SearchOptions,
    ) -> Result<AggregatedSearchResult, SearchError> {
        let started = Instant::now();

        let query = query.trim();
        if query.is_empty() {
            return Err(SearchError::Validation("query must not be empty".into()));
        }
        if options.max_results == 0 {
            return Err(SearchError::Validation(
                "max_results must be at least 1".into(),
            ));
        }
        let max_results = options.max_results.min(self.settings.max_results_cap);

        let key = format!(
            "search:{}:{}:{max_results}",
            normalize_term(query),
            options.platforms.cache_fragment()
        );

        metrics::counter!("keyword_searches_total").increment(1);

        let outcome = tokio::time::timeout(
            self.settings.timeout,
            self.run_search(query, &key, &options, max_results, started),
        )
        .await;

        metrics::histogram!("keyword_search_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        outcome.map_err(|_| {
            warn!(query, timeout = ?self.settings.timeout, "Keyword search timed out");
            SearchError::Timeout(self.settings.timeout)
        })
    }

    async fn related_keywords(
        &self,
        query: &str,
        selection: &PlatformSelection,
    ) -> Vec<KeywordRecord> {
        let normalized = normalize_term(query);
        if normalized.is_empty() {
            return Vec::new();
        }

        let key = format!("related:{normalized}:{}", selection.cache_fragment());
        if let Some(hit) = self.cache.get_json::<Vec<KeywordRecord>>(&key).await {
            debug!(query, "Related keywords cache hit");
            return hit;
        }

        let targets = self.targets(&selection.resolve());
        let related = self.collect_related(query, &targets).await;

        if !related.is_empty() {
            self.cache
                .set_json(&key, &related, self.settings.related_ttl_seconds)
                .await;
        }
        related
    }

    async fn trending_keywords(&self, platform: Option<Platform>) -> Vec<KeywordRecord> {
        let key = format!("trending:{}", platform.map_or("all", Platform::as_str));
        if let Some(hit) = self.cache.get_json::<Vec<KeywordRecord>>(&key).await {
            debug!(key, "Trending keywords cache hit");
            return hit;
        }

        let platforms = platform.map_or_else(|| Platform::ALL.to_vec(), |p| vec![p]);
        let targets = self.targets(&platforms);

        let lookups = targets.iter().map(|(platform, adapter)| async move {
            match adapter.trending(None).await {
                Ok(records) => records,
                Err(e) => {
                    warn!(%platform, error = %e, "Trending lookup failed");
                    Vec::new()
                }
            }
        });

        let mut trending: Vec<KeywordRecord> =
            join_all(lookups).await.into_iter().flatten().collect();
        trending.sort_by(|a, b| b.search_volume.cmp(&a.search_volume));
        trending.truncate(TRENDING_LIMIT);

        if !trending.is_empty() {
            self.cache
                .set_json(&key, &trending, self.settings.trending_ttl_seconds)
                .await;
        }
        trending
    }

    async fn platform_stats(&self) -> BTreeMap<Platform, PlatformStats> {
        if let Some(hit) = self
            .cache
            .get_json::<BTreeMap<Platform, PlatformStats>>(STATS_CACHE_KEY)
            .await
        {
            return hit;
        }

        let now = Utc::now();
        let stats: BTreeMap<Platform, PlatformStats> = Platform::ALL
            .into_iter()
            .map(|platform| {
                let stats = self.adapters.get(&platform).map_or_else(
                    || PlatformStats {
                        name: platform.display_name().to_string(),
                        status: PlatformStatus::Disabled,
                        last_checked: now,
                        rate_limit: None,
                        features: Vec::new(),
                        supports_trending: false,
                    },
                    |adapter| PlatformStats {
                        name: platform.display_name().to_string(),
                        status: PlatformStatus::Active,
                        last_checked: now,
                        rate_limit: Some(adapter.rate_limit()),
                        features: adapter.features().iter().map(ToString::to_string).collect(),
                        supports_trending: adapter.supports_trending(),
                    },
                );
                (platform, stats)
            })
            .collect();

        self.cache
            .set_json(STATS_CACHE_KEY, &stats, self.settings.stats_ttl_seconds)
            .await;
        stats
    }

    async fn health_check(&self) -> BTreeMap<Platform, bool> {
        let targets = self.targets(&self.registered_platforms());

        let probes = targets.iter().map(|(platform, adapter)| async move {
            let healthy = match adapter.search(HEALTH_PROBE_QUERY, 1).await {
                Ok(_) => true,
                Err(e) => {
                    warn!(%platform, error = %e, "Health check failed");
                    false
                }
            };
            (*platform, healthy)
        });

        join_all(probes).await.into_iter().collect()
    }

    async fn bulk_analyze(
        &self,
        keywords: &[String],
        options: SearchOptions,
    ) -> Result<BulkAnalysis, SearchError> {
        let started = Instant::now();

        if keywords.is_empty() {
            return Err(SearchError::Validation(
                "at least one keyword is required".into(),
            ));
        }
        if keywords.len() > MAX_BULK_KEYWORDS {
            return Err(SearchError::Validation(format!(
                "at most {MAX_BULK_KEYWORDS} keywords can be analyzed at once"
            )));
        }

        let mut seen = HashSet::new();
        let distinct: Vec<&str> = keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| seen.insert(normalize_term(k)))
            .collect();

        info!(keywords = distinct.len(), "Starting bulk keyword analysis");

        let searches = distinct.iter().map(|keyword| {
            let options = options.clone();
            async move {
                match self.search_keywords(keyword, options).await {
                    Ok(result) => BulkKeywordResult::from_search(keyword, result),
                    Err(e) => {
                        warn!(keyword, error = %e, "Bulk keyword search failed");
                        BulkKeywordResult::failed(keyword, e.to_string())
                    }
                }
            }
        });
        let results = join_all(searches).await;

        Ok(BulkAnalysis::from_results(results, elapsed_ms(started)))
    }

    async fn categories(&self, platform: Platform) -> Result<Vec<Category>, SearchError> {
        match self.adapter(platform)?.categories().await {
            Ok(categories) => Ok(categories),
            Err(e) => {
                warn!(%platform, error = %e, "Category lookup failed");
                Ok(Vec::new())
            }
        }
    }

    async fn item_details(
        &self,
        platform: Platform,
        item_id: &str,
    ) -> Result<Option<ItemDetails>, SearchError> {
        match self.adapter(platform)?.item_details(item_id).await {
            Ok(details) => Ok(details),
            Err(e) => {
                warn!(%platform, item_id, error = %e, "Item lookup failed");
                Ok(None)
            }
        }
    }

    async fn group_listings(
        &self,
        platform: Platform,
        group_id: &str,
        limit: usize,
    ) -> Result<Vec<KeywordRecord>, SearchError> {
        if limit == 0 {
            return Err(SearchError::Validation("limit must be at least 1".into()));
        }
        let limit = limit.min(self.settings.max_results_cap);

        match self.adapter(platform)?.group_listings(group_id, limit).await {
            Ok(listings) => Ok(listings),
            Err(e) => {
                warn!(%platform, group_id, error = %e, "Listing lookup failed");
                Ok(Vec::new())
            }
        }
    }

    fn registered_platforms(&self) -> Vec<Platform> {
        Platform::ALL
            .into_iter()
            .filter(|p| self.adapters.contains_key(p))
            .collect()
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// A synthetic record standing in for a related term the marketplace has
/// no metrics for.
#[allow(clippy::cast_precision_loss)]
fn related_placeholder(
    platform: Platform,
    term: &str,
    estimator: &dyn VolumeEstimator,
) -> Option<KeywordRecord> {
    let slug = normalize_term(term).replace(' ', "-");
    let difficulty = 25 + i64::try_from(estimator.jitter(50)).unwrap_or(0);

    let metrics = KeywordMetrics {
        search_volume: scoring::jittered(estimator, 100, 1000),
        trend: Trend::Stable,
        competition: Competition::Medium,
        competition_score: None,
        potential_revenue: scoring::jittered(estimator, 100, 1000) as f64,
        cpc: estimator.roll().mul_add(2.0, 0.5),
        difficulty: Difficulty::clamped(difficulty),
    };

    KeywordRecord::new(platform, &format!("related-{slug}"), term, metrics)
}

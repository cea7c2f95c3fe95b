use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub server: ServerConfig,

    pub cache: CacheConfig,

    pub search: SearchConfig,

    pub observability: ObservabilityConfig,

    pub amazon: AmazonConfig,

    pub etsy: EtsyConfig,

    pub ebay: EbayConfig,

    pub shopify: ShopifyConfig,

    pub gumroad: GumroadConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub log_level: String,

    /// Emit logs as JSON lines instead of the human readable format.
    pub json_logs: bool,

    /// Number of tokio worker threads (default: 2)
    /// Set to 0 to use the number of CPU cores
    pub worker_threads: usize,

    /// Per-request timeout for marketplace calls.
    pub http_timeout_seconds: u64,

    pub user_agent: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            worker_threads: 2,
            http_timeout_seconds: 10,
            user_agent: "keyscout/0.1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,

    pub port: u16,

    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 3001,
            cors_allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Memory,
    Redis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,

    pub redis_url: String,

    /// TTL for adapter results and aggregated searches.
    pub default_ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            default_ttl_seconds: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub default_max_results: usize,

    /// Requests above this are clamped.
    pub max_results_cap: usize,

    /// Upper bound on one aggregated search, cache lookups included.
    pub timeout_seconds: u64,

    pub related_cache_ttl_seconds: u64,

    pub trending_cache_ttl_seconds: u64,

    pub stats_cache_ttl_seconds: u64,

    /// Entries kept per user in search history.
    pub history_limit: usize,

    /// Saved keywords kept per user.
    pub favorites_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_max_results: 50,
            max_results_cap: 100,
            timeout_seconds: 30,
            related_cache_ttl_seconds: 1800,
            trending_cache_ttl_seconds: 3600,
            stats_cache_ttl_seconds: 300,
            history_limit: 100,
            favorites_limit: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,

    pub metrics_port: Option<u16>,

    pub loki_enabled: bool,

    pub loki_url: String,

    pub loki_labels: std::collections::HashMap<String, String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        let mut labels = std::collections::HashMap::new();
        labels.insert("app".to_string(), "keyscout".to_string());

        Self {
            metrics_enabled: true,
            metrics_port: None,
            loki_enabled: false,
            loki_url: "http://localhost:3100".to_string(),
            loki_labels: labels,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AmazonConfig {
    pub enabled: bool,

    pub access_key: String,

    pub secret_key: String,

    pub associate_tag: String,

    pub region: String,

    /// Overrides the regional endpoint when set.
    pub base_url: Option<String>,

    pub rate_limit_ms: u64,
}

impl Default for AmazonConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            access_key: String::new(),
            secret_key: String::new(),
            associate_tag: String::new(),
            region: "us-east-1".to_string(),
            base_url: None,
            rate_limit_ms: 1000,
        }
    }
}

impl AmazonConfig {
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.access_key.is_empty()
            && !self.secret_key.is_empty()
            && !self.associate_tag.is_empty()
    }

    #[must_use]
    pub fn api_base(&self) -> String {
        if let Some(url) = self.base_url.as_ref().filter(|u| !u.is_empty()) {
            return url.trim_end_matches('/').to_string();
        }
        match self.region.as_str() {
            "eu-west-1" => "https://webservices.amazon.co.uk",
            "eu-central-1" => "https://webservices.amazon.de",
            "ap-northeast-1" => "https://webservices.amazon.co.jp",
            _ => "https://webservices.amazon.com",
        }
        .to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EtsyConfig {
    pub enabled: bool,

    pub api_key: String,

    pub base_url: String,

    pub rate_limit_ms: u64,
}

impl Default for EtsyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: String::new(),
            base_url: "https://openapi.etsy.com/v3".to_string(),
            rate_limit_ms: 100,
        }
    }
}

impl EtsyConfig {
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EbayConfig {
    pub enabled: bool,

    pub app_id: String,

    pub cert_id: String,

    pub sandbox: bool,

    pub base_url: String,

    pub sandbox_url: String,

    pub rate_limit_ms: u64,
}

impl Default for EbayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            app_id: String::new(),
            cert_id: String::new(),
            sandbox: false,
            base_url: "https://api.ebay.com".to_string(),
            sandbox_url: "https://api.sandbox.ebay.com".to_string(),
            rate_limit_ms: 200,
        }
    }
}

impl EbayConfig {
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.app_id.is_empty() && !self.cert_id.is_empty()
    }

    #[must_use]
    pub fn api_base(&self) -> &str {
        let base = if self.sandbox {
            &self.sandbox_url
        } else {
            &self.base_url
        };
        base.trim_end_matches('/')
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShopifyConfig {
    pub enabled: bool,

    pub shop_domain: String,

    pub access_token: String,

    pub api_version: String,

    /// Overrides `https://<shop_domain>/admin/api/<api_version>` when set.
    pub base_url: Option<String>,

    pub rate_limit_ms: u64,
}

impl Default for ShopifyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            shop_domain: String::new(),
            access_token: String::new(),
            api_version: "2023-10".to_string(),
            base_url: None,
            rate_limit_ms: 500,
        }
    }
}

impl ShopifyConfig {
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.access_token.is_empty()
            && (!self.shop_domain.is_empty() || self.base_url.is_some())
    }

    #[must_use]
    pub fn api_base(&self) -> String {
        self.base_url
            .as_ref()
            .filter(|u| !u.is_empty())
            .map_or_else(
                || {
                    format!(
                        "https://{}/admin/api/{}",
                        self.shop_domain, self.api_version
                    )
                },
                |u| u.trim_end_matches('/').to_string(),
            )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GumroadConfig {
    pub enabled: bool,

    pub access_token: String,

    pub base_url: String,

    pub rate_limit_ms: u64,
}

impl Default for GumroadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            access_token: String::new(),
            base_url: "https://api.gumroad.com/v2".to_string(),
            rate_limit_ms: 1000,
        }
    }
}

impl GumroadConfig {
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.access_token.is_empty()
    }
}

impl Config {
    /// Loads the first config file found, then applies environment overrides.
    pub fn load() -> Result<Self> {
        let paths = Self::config_paths();

        let mut config = match paths.iter().find(|p| p.exists()) {
            Some(path) => {
                info!("Loading config from: {}", path.display());
                Self::load_from_path(path)?
            }
            None => {
                info!("No config file found, using defaults");
                Self::default()
            }
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Credentials and the Redis URL may come from the environment instead
    /// of the config file. Empty variables are ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("AMAZON_ACCESS_KEY") {
            self.amazon.access_key = v;
        }
        if let Some(v) = var("AMAZON_SECRET_KEY") {
            self.amazon.secret_key = v;
        }
        if let Some(v) = var("AMAZON_ASSOCIATE_TAG") {
            self.amazon.associate_tag = v;
        }
        if let Some(v) = var("AMAZON_REGION") {
            self.amazon.region = v;
        }
        if let Some(v) = var("ETSY_API_KEY") {
            self.etsy.api_key = v;
        }
        if let Some(v) = var("EBAY_APP_ID") {
            self.ebay.app_id = v;
        }
        if let Some(v) = var("EBAY_CERT_ID") {
            self.ebay.cert_id = v;
        }
        if let Some(v) = var("EBAY_SANDBOX") {
            self.ebay.sandbox = v.eq_ignore_ascii_case("true");
        }
        if let Some(v) = var("SHOPIFY_SHOP_DOMAIN") {
            self.shopify.shop_domain = v;
        }
        if let Some(v) = var("SHOPIFY_ACCESS_TOKEN") {
            self.shopify.access_token = v;
        }
        if let Some(v) = var("SHOPIFY_API_VERSION") {
            self.shopify.api_version = v;
        }
        if let Some(v) = var("GUMROAD_ACCESS_TOKEN") {
            self.gumroad.access_token = v;
        }
        if let Some(v) = var("REDIS_URL") {
            self.cache.redis_url = v;
            self.cache.backend = CacheBackend::Redis;
        }
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("keyscout").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".keyscout").join("config.toml"));
        }

        paths
    }

    fn default_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    pub fn create_default_if_missing() -> Result<bool> {
        let path = Self::default_config_path();
        if path.exists() {
            Ok(false)
        } else {
            let config = Self::default();
            config.save_to_path(&path)?;
            info!("Created default config file: {}", path.display());
            Ok(true)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.enabled && self.server.port == 0 {
            anyhow::bail!("Server port must be > 0");
        }

        if self.search.default_max_results == 0 || self.search.max_results_cap == 0 {
            anyhow::bail!("Search result limits must be > 0");
        }

        if self.search.default_max_results > self.search.max_results_cap {
            anyhow::bail!(
                "search.default_max_results ({}) exceeds search.max_results_cap ({})",
                self.search.default_max_results,
                self.search.max_results_cap
            );
        }

        if self.search.timeout_seconds == 0 {
            anyhow::bail!("Search timeout must be > 0");
        }

        if self.cache.backend == CacheBackend::Redis && self.cache.redis_url.trim().is_empty() {
            anyhow::bail!("Redis URL cannot be empty when the redis cache backend is selected");
        }

        Ok(())
    }
}

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

impl<T> ApiResponse<T> {
    pub const fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            meta: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            meta: None,
        }
    }

    #[must_use]
    pub fn with_meta(mut self, meta: serde_json::Value) -> Self {
        self.meta = Some(meta);
        self
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    pub keyword: Option<String>,
    pub platform: Option<String>,
    /// Comma separated platform names.
    pub platforms: Option<String>,
    #[serde(default)]
    pub include_related: bool,
    #[serde(default)]
    pub include_trends: bool,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct RelatedParams {
    pub keyword: Option<String>,
    pub platforms: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TrendingParams {
    pub platform: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PageParams {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkAnalyzeRequest {
    #[serde(default)]
    pub keywords: Vec<String>,
    pub platform: Option<String>,
    /// Comma separated platform names.
    pub platforms: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct FavoriteRequest {
    pub keyword: Option<String>,
    pub platform: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListingsParams {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct CachePurgeParams {
    pub pattern: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthDto {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub cache_backend: &'static str,
    pub platforms: Vec<crate::domain::Platform>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CachePurgeDto {
    pub pattern: String,
    pub deleted: usize,
}

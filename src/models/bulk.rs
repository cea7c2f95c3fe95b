use serde::{Deserialize, Serialize};

use super::{AggregatedSearchResult, KeywordRecord};
use crate::domain::Platform;

/// Outcome of one keyword inside a bulk analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkKeywordResult {
    pub keyword: String,
    /// Highest ranked record for the keyword, if any marketplace had one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top: Option<KeywordRecord>,
    pub total_results: usize,
    pub cached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BulkKeywordResult {
    #[must_use]
    pub fn from_search(keyword: &str, result: AggregatedSearchResult) -> Self {
        Self {
            keyword: keyword.to_string(),
            top: result.keywords.into_iter().next(),
            total_results: result.total_results,
            cached: result.cached,
            error: None,
        }
    }

    #[must_use]
    pub fn failed(keyword: &str, error: impl Into<String>) -> Self {
        Self {
            keyword: keyword.to_string(),
            top: None,
            total_results: 0,
            cached: false,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkAnalysis {
    pub results: Vec<BulkKeywordResult>,
    pub total_keywords: usize,
    /// Mean search volume of the top records; zero when there are none.
    pub average_volume: f64,
    /// Platforms owning the most top records, most first.
    pub top_platforms: Vec<Platform>,
    pub search_time_ms: u64,
    /// True when every keyword was answered from the cache.
    pub cached: bool,
}

impl BulkAnalysis {
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_results(results: Vec<BulkKeywordResult>, search_time_ms: u64) -> Self {
        let tops: Vec<&KeywordRecord> = results.iter().filter_map(|r| r.top.as_ref()).collect();

        let average_volume = if tops.is_empty() {
            0.0
        } else {
            tops.iter().map(|r| r.search_volume as f64).sum::<f64>() / tops.len() as f64
        };

        let mut counts: Vec<(Platform, usize)> = Platform::ALL
            .into_iter()
            .map(|p| (p, tops.iter().filter(|r| r.platform == p).count()))
            .filter(|(_, n)| *n > 0)
            .collect();
        // Stable, so ties keep dispatch order.
        counts.sort_by(|a, b| b.1.cmp(&a.1));

        Self {
            total_keywords: results.len(),
            cached: !results.is_empty() && results.iter().all(|r| r.cached),
            results,
            average_volume,
            top_platforms: counts.into_iter().map(|(p, _)| p).collect(),
            search_time_ms,
        }
    }
}

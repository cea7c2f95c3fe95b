use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    Competition, CompetitionScore, Difficulty, Platform, Trend, normalize_term,
};

/// One observation of a search term on one platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordRecord {
    pub id: String,
    pub term: String,
    pub platform: Platform,
    pub search_volume: u64,
    pub trend: Trend,
    pub competition: Competition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub competition_score: Option<CompetitionScore>,
    pub potential_revenue: f64,
    pub cpc: f64,
    pub difficulty: Difficulty,
    pub last_updated: DateTime<Utc>,
}

/// Metrics an adapter computed for a single native item.
#[derive(Debug, Clone, Copy)]
pub struct KeywordMetrics {
    pub search_volume: u64,
    pub trend: Trend,
    pub competition: Competition,
    pub competition_score: Option<CompetitionScore>,
    pub potential_revenue: f64,
    pub cpc: f64,
    pub difficulty: Difficulty,
}

impl KeywordRecord {
    /// Builds a record stamped with the current time.
    ///
    /// Returns `None` when the term normalizes to nothing. Negative or NaN
    /// money figures are floored at zero.
    #[must_use]
    pub fn new(
        platform: Platform,
        native_id: &str,
        term: &str,
        metrics: KeywordMetrics,
    ) -> Option<Self> {
        let term = normalize_term(term);
        if term.is_empty() || native_id.is_empty() {
            return None;
        }

        Some(Self {
            id: format!("{platform}-{native_id}"),
            term,
            platform,
            search_volume: metrics.search_volume,
            trend: metrics.trend,
            competition: metrics.competition,
            competition_score: metrics.competition_score,
            potential_revenue: non_negative(metrics.potential_revenue),
            cpc: non_negative(metrics.cpc),
            difficulty: metrics.difficulty,
            last_updated: Utc::now(),
        })
    }

    /// Cross-platform ranking score: `search_volume × potential_revenue`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn composite_score(&self) -> f64 {
        self.search_volume as f64 * self.potential_revenue
    }
}

fn non_negative(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value.max(0.0) }
}

/// Up/down/stable counts over a result set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendSummary {
    pub up: usize,
    pub down: usize,
    pub stable: usize,
}

impl TrendSummary {
    #[must_use]
    pub fn from_keywords(keywords: &[KeywordRecord]) -> Self {
        keywords
            .iter()
            .fold(Self::default(), |mut acc, k| {
                match k.trend {
                    Trend::Up => acc.up += 1,
                    Trend::Down => acc.down += 1,
                    Trend::Stable => acc.stable += 1,
                }
                acc
            })
    }
}

/// Output of one aggregation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedSearchResult {
    pub keywords: Vec<KeywordRecord>,
    pub total_results: usize,
    pub platforms: Vec<Platform>,
    pub search_time_ms: u64,
    pub cached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trend_summary: Option<TrendSummary>,
}

impl AggregatedSearchResult {
    #[must_use]
    pub const fn empty(platforms: Vec<Platform>) -> Self {
        Self {
            keywords: Vec::new(),
            total_results: 0,
            platforms,
            search_time_ms: 0,
            cached: false,
            trend_summary: None,
        }
    }
}

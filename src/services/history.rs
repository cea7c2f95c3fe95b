use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::Platform;
use crate::models::AggregatedSearchResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHistoryEntry {
    pub id: String,
    pub query: String,
    pub platforms: Vec<Platform>,
    pub total_results: usize,
    pub cached: bool,
    pub searched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPage {
    pub entries: Vec<SearchHistoryEntry>,
    pub total: usize,
}

/// Per-user log of past searches, newest first.
///
/// Each user keeps at most `limit` entries; older ones fall off the end.
pub struct SearchHistory {
    entries: RwLock<HashMap<String, VecDeque<SearchHistoryEntry>>>,
    limit: usize,
}

impl SearchHistory {
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            limit: limit.max(1),
        }
    }

    pub async fn record(&self, user_id: &str, query: &str, result: &AggregatedSearchResult) {
        let entry = SearchHistoryEntry {
            id: Uuid::new_v4().to_string(),
            query: query.trim().to_string(),
            platforms: result.platforms.clone(),
            total_results: result.total_results,
            cached: result.cached,
            searched_at: Utc::now(),
        };

        let mut entries = self.entries.write().await;
        let log = entries.entry(user_id.to_string()).or_default();
        log.push_front(entry);
        log.truncate(self.limit);
    }

    pub async fn list(&self, user_id: &str, limit: usize, offset: usize) -> HistoryPage {
        let entries = self.entries.read().await;
        let Some(log) = entries.get(user_id) else {
            return HistoryPage {
                entries: Vec::new(),
                total: 0,
            };
        };

        HistoryPage {
            entries: log.iter().skip(offset).take(limit).cloned().collect(),
            total: log.len(),
        }
    }

    pub async fn clear(&self, user_id: &str) -> usize {
        self.entries
            .write()
            .await
            .remove(user_id)
            .map_or(0, |log| log.len())
    }
}

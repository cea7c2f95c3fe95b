use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{Platform, normalize_term};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Favorite {
    pub id: String,
    pub keyword: String,
    pub platform: Platform,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoritesPage {
    pub favorites: Vec<Favorite>,
    pub total: usize,
}

/// Per-user saved keywords, newest first.
///
/// A keyword is saved at most once per platform. Each user keeps at most
/// `limit` favorites; the oldest are dropped first.
pub struct FavoriteStore {
    entries: RwLock<HashMap<String, VecDeque<Favorite>>>,
    limit: usize,
}

impl FavoriteStore {
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            limit: limit.max(1),
        }
    }

    /// Saves `keyword` for `user_id`. Returns the favorite and whether it
    /// was newly created.
    pub async fn add(&self, user_id: &str, keyword: &str, platform: Platform) -> (Favorite, bool) {
        let keyword = normalize_term(keyword);

        let mut entries = self.entries.write().await;
        let saved = entries.entry(user_id.to_string()).or_default();

        if let Some(existing) = saved
            .iter()
            .find(|f| f.platform == platform && f.keyword == keyword)
        {
            return (existing.clone(), false);
        }

        let favorite = Favorite {
            id: Uuid::new_v4().to_string(),
            keyword,
            platform,
            added_at: Utc::now(),
        };
        saved.push_front(favorite.clone());
        saved.truncate(self.limit);

        (favorite, true)
    }

    /// Returns false when the user has no favorite with that id.
    pub async fn remove(&self, user_id: &str, id: &str) -> bool {
        let mut entries = self.entries.write().await;
        let Some(saved) = entries.get_mut(user_id) else {
            return false;
        };

        let before = saved.len();
        saved.retain(|f| f.id != id);
        before != saved.len()
    }

    pub async fn list(&self, user_id: &str, limit: usize, offset: usize) -> FavoritesPage {
        let entries = self.entries.read().await;
        let Some(saved) = entries.get(user_id) else {
            return FavoritesPage {
                favorites: Vec::new(),
                total: 0,
            };
        };

        FavoritesPage {
            favorites: saved.iter().skip(offset).take(limit).cloned().collect(),
            total: saved.len(),
        }
    }
}

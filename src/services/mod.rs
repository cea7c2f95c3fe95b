pub mod keyword_service;
pub use keyword_service::{KeywordService, PlatformStats, PlatformStatus, SearchError};

pub mod aggregation;
pub use aggregation::{AggregationService, AggregationSettings};

pub mod history;
pub use history::{HistoryPage, SearchHistory, SearchHistoryEntry};

pub mod favorites;
pub use favorites::{Favorite, FavoriteStore, FavoritesPage};

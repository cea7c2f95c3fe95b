//! Key/value cache with TTL, used by adapters and by the aggregation service.
//!
//! Backends implement [`CacheStore`] and report failures. [`CacheService`]
//! is what the rest of the crate holds: it never fails, turning every backend
//! error into a logged cache miss.

pub mod memory;
pub mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),

    #[error("value at '{0}' has the wrong type for this operation")]
    WrongType(String),

    #[error("invalid cache pattern '{0}'")]
    Pattern(String),
}

impl From<::redis::RedisError> for CacheError {
    fn from(err: ::redis::RedisError) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Storage backend contract.
///
/// A `ttl` of zero stores the value without expiry.
#[async_trait::async_trait]
pub trait CacheStore: Send + Sync {
    fn name(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    async fn del(&self, key: &str) -> Result<bool, CacheError>;

    async fn exists(&self, key: &str) -> Result<bool, CacheError>;

    /// Keys matching a glob pattern (`*` and `?`).
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, CacheError>;

    async fn delete_by_pattern(&self, pattern: &str) -> Result<usize, CacheError>;

    async fn increment(&self, key: &str, by: i64) -> Result<i64, CacheError>;

    async fn decrement(&self, key: &str, by: i64) -> Result<i64, CacheError>;

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, CacheError>;

    async fn hset(&self, key: &str, field: &str, value: String) -> Result<(), CacheError>;

    async fn hdel(&self, key: &str, field: &str) -> Result<bool, CacheError>;

    /// Remaining lifetime; `None` when the key is missing or never expires.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError>;

    async fn flush(&self) -> Result<(), CacheError>;
}

/// Infallible cache facade over a [`CacheStore`].
#[derive(Clone)]
pub struct CacheService {
    store: Arc<dyn CacheStore>,
}

impl CacheService {
    #[must_use]
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// In-process cache, used by tests and single-node deployments.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    #[must_use]
    pub fn backend(&self) -> &'static str {
        self.store.name()
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        match self.store.get(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "Cache read failed, treating as miss");
                None
            }
        }
    }

    pub async fn set(&self, key: &str, value: String, ttl_seconds: u64) -> bool {
        match self
            .store
            .set(key, value, Duration::from_secs(ttl_seconds))
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(key, error = %e, "Cache write failed");
                false
            }
        }
    }

    /// Reads and decodes a JSON value. Undecodable entries count as misses.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get(key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(key, error = %e, "Discarding undecodable cache entry");
                None
            }
        }
    }

    pub async fn set_json<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl_seconds: u64,
    ) -> bool {
        match serde_json::to_string(value) {
            Ok(raw) => self.set(key, raw, ttl_seconds).await,
            Err(e) => {
                warn!(key, error = %e, "Failed to encode cache value");
                false
            }
        }
    }

    pub async fn del(&self, key: &str) -> bool {
        self.store.del(key).await.unwrap_or_else(|e| {
            warn!(key, error = %e, "Cache delete failed");
            false
        })
    }

    pub async fn exists(&self, key: &str) -> bool {
        self.store.exists(key).await.unwrap_or_else(|e| {
            warn!(key, error = %e, "Cache exists check failed");
            false
        })
    }

    pub async fn keys(&self, pattern: &str) -> Vec<String> {
        self.store.keys(pattern).await.unwrap_or_else(|e| {
            warn!(pattern, error = %e, "Cache key scan failed");
            Vec::new()
        })
    }

    pub async fn delete_by_pattern(&self, pattern: &str) -> usize {
        self.store
            .delete_by_pattern(pattern)
            .await
            .unwrap_or_else(|e| {
                warn!(pattern, error = %e, "Cache pattern delete failed");
                0
            })
    }

    pub async fn increment(&self, key: &str, by: i64) -> i64 {
        self.store.increment(key, by).await.unwrap_or_else(|e| {
            warn!(key, error = %e, "Cache increment failed");
            0
        })
    }

    pub async fn decrement(&self, key: &str, by: i64) -> i64 {
        self.store.decrement(key, by).await.unwrap_or_else(|e| {
            warn!(key, error = %e, "Cache decrement failed");
            0
        })
    }

    pub async fn hget_json<T: DeserializeOwned>(&self, key: &str, field: &str) -> Option<T> {
        let raw = match self.store.hget(key, field).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(key, field, error = %e, "Cache hash read failed");
                return None;
            }
        };
        serde_json::from_str(&raw).ok()
    }

    pub async fn hset_json<T: Serialize + ?Sized>(&self, key: &str, field: &str, value: &T) -> bool {
        let Ok(raw) = serde_json::to_string(value) else {
            return false;
        };
        match self.store.hset(key, field, raw).await {
            Ok(()) => true,
            Err(e) => {
                warn!(key, field, error = %e, "Cache hash write failed");
                false
            }
        }
    }

    pub async fn hdel(&self, key: &str, field: &str) -> bool {
        self.store.hdel(key, field).await.unwrap_or_else(|e| {
            warn!(key, field, error = %e, "Cache hash delete failed");
            false
        })
    }

    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        self.store.ttl(key).await.unwrap_or_else(|e| {
            warn!(key, error = %e, "Cache ttl lookup failed");
            None
        })
    }

    pub async fn flush(&self) -> bool {
        match self.store.flush().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Cache flush failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Backend that fails every call.
    struct BrokenStore;

    #[async_trait::async_trait]
    impl CacheStore for BrokenStore {
        fn name(&self) -> &'static str {
            "broken"
        }

        async fn get(&self, _: &str) -> Result<Option<String>, CacheError> {
            Err(CacheError::Backend("down".into()))
        }

        async fn set(&self, _: &str, _: String, _: Duration) -> Result<(), CacheError> {
            Err(CacheError::Backend("down".into()))
        }

        async fn del(&self, _: &str) -> Result<bool, CacheError> {
            Err(CacheError::Backend("down".into()))
        }

        async fn exists(&self, _: &str) -> Result<bool, CacheError> {
            Err(CacheError::Backend("down".into()))
        }

        async fn keys(&self, _: &str) -> Result<Vec<String>, CacheError> {
            Err(CacheError::Backend("down".into()))
        }

        async fn delete_by_pattern(&self, _: &str) -> Result<usize, CacheError> {
            Err(CacheError::Backend("down".into()))
        }

        async fn increment(&self, _: &str, _: i64) -> Result<i64, CacheError> {
            Err(CacheError::Backend("down".into()))
        }

        async fn decrement(&self, _: &str, _: i64) -> Result<i64, CacheError> {
            Err(CacheError::Backend("down".into()))
        }

        async fn hget(&self, _: &str, _: &str) -> Result<Option<String>, CacheError> {
            Err(CacheError::Backend("down".into()))
        }

        async fn hset(&self, _: &str, _: &str, _: String) -> Result<(), CacheError> {
            Err(CacheError::Backend("down".into()))
        }

        async fn hdel(&self, _: &str, _: &str) -> Result<bool, CacheError> {
            Err(CacheError::Backend("down".into()))
        }

        async fn ttl(&self, _: &str) -> Result<Option<Duration>, CacheError> {
            Err(CacheError::Backend("down".into()))
        }

        async fn flush(&self) -> Result<(), CacheError> {
            Err(CacheError::Backend("down".into()))
        }
    }

    #[tokio::test]
    async fn backend_failures_degrade_to_misses() {
        let cache = CacheService::new(Arc::new(BrokenStore));

        assert!(!cache.set_json("k", &vec![1, 2, 3], 60).await);
        assert_eq!(cache.get_json::<Vec<i32>>("k").await, None);
        assert!(!cache.exists("k").await);
        assert!(cache.keys("*").await.is_empty());
        assert_eq!(cache.delete_by_pattern("*").await, 0);
        assert_eq!(cache.increment("n", 1).await, 0);
        assert_eq!(cache.hget_json::<String>("h", "f").await, None);
        assert!(!cache.flush().await);
    }

    #[tokio::test]
    async fn json_round_trip_through_memory() {
        let cache = CacheService::in_memory();
        assert!(cache.set_json("k", &vec!["a".to_string()], 60).await);
        assert_eq!(
            cache.get_json::<Vec<String>>("k").await,
            Some(vec!["a".to_string()])
        );
        assert_eq!(cache.backend(), "memory");
    }

    #[tokio::test]
    async fn undecodable_entry_is_a_miss() {
        let cache = CacheService::in_memory();
        cache.set("k", "not json".to_string(), 60).await;
        assert_eq!(cache.get_json::<Vec<u8>>("k").await, None);
    }
}

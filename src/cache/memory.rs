use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use regex::Regex;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::{CacheError, CacheStore};

#[derive(Debug, Clone)]
enum Value {
    Text(String),
    Hash(HashMap<String, String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// Writes between full sweeps of expired entries.
const SWEEP_EVERY: usize = 256;

/// Process-local store with lazy expiry.
///
/// A read that finds an expired entry removes it, and every
/// [`SWEEP_EVERY`]th write drops all expired entries, so keys that are
/// never read again do not pile up.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.write().await.retain(|_, e| e.is_live(now));
    }

    /// Removes `key` if it is still expired once the write lock is held.
    async fn evict_if_expired(&self, key: &str) {
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|e| !e.is_live(Instant::now())) {
            entries.remove(key);
        }
    }

    fn sweep_due(&self) -> bool {
        self.writes.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1
    }

    /// Number of entries held, expired or not.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn add(&self, key: &str, by: i64) -> Result<i64, CacheError> {
        let mut entries = self.entries.write().await;
        let now = Instant::now();

        let (current, expires_at) = match entries.get(key) {
            Some(entry) if entry.is_live(now) => match &entry.value {
                Value::Text(raw) => (
                    raw.parse::<i64>()
                        .map_err(|_| CacheError::WrongType(key.to_string()))?,
                    entry.expires_at,
                ),
                Value::Hash(_) => return Err(CacheError::WrongType(key.to_string())),
            },
            _ => (0, None),
        };

        let next = current.saturating_add(by);
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Text(next.to_string()),
                expires_at,
            },
        );
        Ok(next)
    }
}

/// Translates a glob with `*` and `?` into an anchored regex.
pub(crate) fn glob_to_regex(pattern: &str) -> Result<Regex, CacheError> {
    let mut expr = String::with_capacity(pattern.len() + 8);
    expr.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            other => expr.push_str(&regex::escape(&other.to_string())),
        }
    }
    expr.push('$');
    Regex::new(&expr).map_err(|_| CacheError::Pattern(pattern.to_string()))
}

fn expiry_for(ttl: Duration) -> Option<Instant> {
    if ttl.is_zero() {
        None
    } else {
        Some(Instant::now() + ttl)
    }
}

#[async_trait::async_trait]
impl CacheStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.is_live(Instant::now()) => {
                    return match &entry.value {
                        Value::Text(raw) => Ok(Some(raw.clone())),
                        Value::Hash(_) => Err(CacheError::WrongType(key.to_string())),
                    };
                }
                None => return Ok(None),
                Some(_) => {}
            }
        }

        self.evict_if_expired(key).await;
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let sweep = self.sweep_due();
        let mut entries = self.entries.write().await;
        if sweep {
            let now = Instant::now();
            entries.retain(|_, e| e.is_live(now));
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Text(value),
                expires_at: expiry_for(ttl),
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<bool, CacheError> {
        let removed = self.entries.write().await.remove(key);
        Ok(removed.is_some_and(|e| e.is_live(Instant::now())))
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let expired = {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(e) if e.is_live(Instant::now()) => return Ok(true),
                Some(_) => true,
                None => false,
            }
        };

        if expired {
            self.evict_if_expired(key).await;
        }
        Ok(false)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        let matcher = glob_to_regex(pattern)?;
        self.purge_expired().await;

        let entries = self.entries.read().await;
        let mut keys: Vec<String> = entries
            .keys()
            .filter(|k| matcher.is_match(k))
            .cloned()
            .collect();
        keys.sort_unstable();
        Ok(keys)
    }

    async fn delete_by_pattern(&self, pattern: &str) -> Result<usize, CacheError> {
        let matcher = glob_to_regex(pattern)?;
        let now = Instant::now();

        let mut entries = self.entries.write().await;
        let before = entries.len();
        let mut expired = 0;
        entries.retain(|k, e| {
            if !e.is_live(now) {
                expired += 1;
                return false;
            }
            !matcher.is_match(k)
        });
        Ok(before - entries.len() - expired)
    }

    async fn increment(&self, key: &str, by: i64) -> Result<i64, CacheError> {
        self.add(key, by).await
    }

    async fn decrement(&self, key: &str, by: i64) -> Result<i64, CacheError> {
        self.add(key, by.saturating_neg()).await
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, CacheError> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if entry.is_live(Instant::now()) => match &entry.value {
                Value::Hash(fields) => Ok(fields.get(field).cloned()),
                Value::Text(_) => Err(CacheError::WrongType(key.to_string())),
            },
            _ => Ok(None),
        }
    }

    async fn hset(&self, key: &str, field: &str, value: String) -> Result<(), CacheError> {
        let mut entries = self.entries.write().await;
        let now = Instant::now();

        let entry = entries
            .entry(key.to_string())
            .and_modify(|e| {
                if !e.is_live(now) {
                    *e = Entry {
                        value: Value::Hash(HashMap::new()),
                        expires_at: None,
                    };
                }
            })
            .or_insert_with(|| Entry {
                value: Value::Hash(HashMap::new()),
                expires_at: None,
            });

        match &mut entry.value {
            Value::Hash(fields) => {
                fields.insert(field.to_string(), value);
                Ok(())
            }
            Value::Text(_) => Err(CacheError::WrongType(key.to_string())),
        }
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<bool, CacheError> {
        let mut entries = self.entries.write().await;
        let now = Instant::now();

        let Some(entry) = entries.get_mut(key).filter(|e| e.is_live(now)) else {
            return Ok(false);
        };
        let (removed, now_empty) = match &mut entry.value {
            Value::Hash(fields) => (fields.remove(field).is_some(), fields.is_empty()),
            Value::Text(_) => return Err(CacheError::WrongType(key.to_string())),
        };
        if now_empty {
            entries.remove(key);
        }
        Ok(removed)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        let entries = self.entries.read().await;
        let now = Instant::now();
        Ok(entries
            .get(key)
            .filter(|e| e.is_live(now))
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(now)))
    }

    async fn flush(&self) -> Result<(), CacheError> {
        self.entries.write().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get() {
        let store = MemoryStore::new();
        store
            .set("etsy:planner:10", "[]".into(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(
            store.get("etsy:planner:10").await.unwrap().as_deref(),
            Some("[]")
        );
        assert!(store.exists("etsy:planner:10").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn reading_an_expired_key_reclaims_it() {
        let store = MemoryStore::new();
        for i in 0..1000 {
            store
                .set(&format!("search:q{i}:etsy:10"), "[]".into(), Duration::from_secs(1))
                .await
                .unwrap();
        }

        tokio::time::advance(Duration::from_secs(5)).await;

        for i in 0..1000 {
            assert_eq!(store.get(&format!("search:q{i}:etsy:10")).await.unwrap(), None);
        }
        for i in 0..1000 {
            store
                .set(&format!("search:fresh{i}:etsy:10"), "[]".into(), Duration::from_secs(60))
                .await
                .unwrap();
        }

        assert_eq!(store.len().await, 1000);
    }

    #[tokio::test(start_paused = true)]
    async fn writes_sweep_expired_keys_nobody_reads() {
        let store = MemoryStore::new();
        for i in 0..SWEEP_EVERY {
            store
                .set(&format!("old{i}"), "x".into(), Duration::from_secs(1))
                .await
                .unwrap();
        }

        tokio::time::advance(Duration::from_secs(2)).await;

        for i in 0..SWEEP_EVERY {
            store
                .set(&format!("new{i}"), "x".into(), Duration::ZERO)
                .await
                .unwrap();
        }

        assert!(store.len().await <= SWEEP_EVERY);
        assert!(store.exists(&format!("new{}", SWEEP_EVERY - 1)).await.unwrap());

        store.set("gone", "x".into(), Duration::from_secs(1)).await.unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!store.exists("gone").await.unwrap());
        assert!(store.entries.read().await.get("gone").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_are_invisible() {
        let store = MemoryStore::new();
        store
            .set("k", "v".into(), Duration::from_secs(5))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(6)).await;

        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(!store.exists("k").await.unwrap());
        assert!(store.keys("*").await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_ttl_never_expires() {
        let store = MemoryStore::new();
        store.set("k", "v".into(), Duration::ZERO).await.unwrap();
        tokio::time::advance(Duration::from_secs(86_400)).await;
        assert!(store.exists("k").await.unwrap());
        assert_eq!(store.ttl("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn last_write_wins() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(60);
        store.set("k", "first".into(), ttl).await.unwrap();
        store.set("k", "second".into(), ttl).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn glob_patterns() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(60);
        for key in ["etsy:a:1", "etsy:b:2", "ebay:a:1", "search:a.b"] {
            store.set(key, "x".into(), ttl).await.unwrap();
        }

        assert_eq!(
            store.keys("etsy:*").await.unwrap(),
            vec!["etsy:a:1".to_string(), "etsy:b:2".to_string()]
        );
        assert_eq!(store.keys("e?ay:*").await.unwrap(), vec!["ebay:a:1".to_string()]);
        // Regex metacharacters in the pattern are literal.
        assert_eq!(store.keys("search:a.b").await.unwrap().len(), 1);
        assert!(store.keys("search:axb").await.unwrap().is_empty());

        assert_eq!(store.delete_by_pattern("etsy:*").await.unwrap(), 2);
        assert_eq!(store.keys("*").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn counters() {
        let store = MemoryStore::new();
        assert_eq!(store.increment("hits", 1).await.unwrap(), 1);
        assert_eq!(store.increment("hits", 4).await.unwrap(), 5);
        assert_eq!(store.decrement("hits", 2).await.unwrap(), 3);

        store
            .set("word", "abc".into(), Duration::ZERO)
            .await
            .unwrap();
        assert!(matches!(
            store.increment("word", 1).await,
            Err(CacheError::WrongType(_))
        ));
    }

    #[tokio::test]
    async fn hash_fields() {
        let store = MemoryStore::new();
        store.hset("stats", "etsy", "1".into()).await.unwrap();
        store.hset("stats", "ebay", "2".into()).await.unwrap();

        assert_eq!(store.hget("stats", "etsy").await.unwrap().as_deref(), Some("1"));
        assert_eq!(store.hget("stats", "amazon").await.unwrap(), None);
        assert!(matches!(store.get("stats").await, Err(CacheError::WrongType(_))));

        assert!(store.hdel("stats", "etsy").await.unwrap());
        assert!(!store.hdel("stats", "etsy").await.unwrap());
        assert!(store.hdel("stats", "ebay").await.unwrap());
        assert!(!store.exists("stats").await.unwrap());
    }

    #[tokio::test]
    async fn ttl_and_flush() {
        let store = MemoryStore::new();
        store
            .set("k", "v".into(), Duration::from_secs(120))
            .await
            .unwrap();
        let remaining = store.ttl("k").await.unwrap().unwrap();
        assert!(remaining <= Duration::from_secs(120));
        assert!(remaining > Duration::from_secs(100));

        store.flush().await.unwrap();
        assert_eq!(store.ttl("k").await.unwrap(), None);
        assert!(!store.exists("k").await.unwrap());
    }
}

use std::time::Duration;

use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::{AsyncCommands, Client};
use tracing::info;

use super::{CacheError, CacheStore};

/// Redis-backed store. Values are kept as plain strings.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let config = ConnectionManagerConfig::new().set_number_of_retries(2);

        let client = Client::open(url)?;
        let conn = client.get_connection_manager_with_config(config).await?;

        info!("Connected to Redis cache");
        Ok(Self { conn })
    }

    fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

#[async_trait::async_trait]
impl CacheStore for RedisStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.conn().get(key).await?)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn();
        if ttl.is_zero() {
            conn.set::<_, _, ()>(key, value).await?;
        } else {
            conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
                .await?;
        }
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<bool, CacheError> {
        let removed: i64 = self.conn().del(key).await?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.conn().exists(key).await?)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        let mut keys: Vec<String> = self.conn().keys(pattern).await?;
        keys.sort_unstable();
        Ok(keys)
    }

    async fn delete_by_pattern(&self, pattern: &str) -> Result<usize, CacheError> {
        let keys = self.keys(pattern).await?;
        if keys.is_empty() {
            return Ok(0);
        }
        let removed: usize = self.conn().del(keys).await?;
        Ok(removed)
    }

    async fn increment(&self, key: &str, by: i64) -> Result<i64, CacheError> {
        Ok(self.conn().incr(key, by).await?)
    }

    async fn decrement(&self, key: &str, by: i64) -> Result<i64, CacheError> {
        Ok(self.conn().decr(key, by).await?)
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, CacheError> {
        Ok(self.conn().hget(key, field).await?)
    }

    async fn hset(&self, key: &str, field: &str, value: String) -> Result<(), CacheError> {
        self.conn().hset::<_, _, _, ()>(key, field, value).await?;
        Ok(())
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<bool, CacheError> {
        let removed: i64 = self.conn().hdel(key, field).await?;
        Ok(removed > 0)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        // -2 for a missing key, -1 for no expiry.
        let secs: i64 = self.conn().ttl(key).await?;
        Ok(u64::try_from(secs).ok().map(Duration::from_secs))
    }

    async fn flush(&self) -> Result<(), CacheError> {
        let mut conn = self.conn();
        redis::cmd("FLUSHDB").query_async::<()>(&mut conn).await?;
        Ok(())
    }
}

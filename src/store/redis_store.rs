//! Redis-backed store
//!
//! Connections come from a `deadpool-redis` pool; every primitive maps onto
//! a single Redis command.

use async_trait::async_trait;
use deadpool_redis::{Config as PoolConfig, Connection, Pool, Runtime};
use redis::AsyncCommands;
use std::collections::HashMap;
use std::time::Duration;

use super::{KvStore, StoreError, StoreResult};

/// Redis connection settings
#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    /// Redis URL (e.g., redis://localhost:6379)
    pub url: String,

    /// Connection pool size
    pub pool_size: usize,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            pool_size: 8,
        }
    }
}

/// Pooled Redis client implementing [`KvStore`]
pub struct RedisStore {
    pool: Pool,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("pool_status", &self.pool.status())
            .finish()
    }
}

impl RedisStore {
    /// Build the pool and verify the server answers `PING`
    pub async fn connect(config: &RedisStoreConfig) -> StoreResult<Self> {
        let pool = PoolConfig::from_url(&config.url)
            .builder()
            .map_err(|e| StoreError::Connection(format!("invalid pool config: {e}")))?
            .max_size(config.pool_size)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| StoreError::Connection(format!("failed to build pool: {e}")))?;

        let store = Self { pool };
        let mut conn = store.conn().await?;
        let _: String = redis::cmd("PING").query_async(&mut *conn).await?;

        tracing::info!(url = %config.url, pool_size = config.pool_size, "Connected to Redis");
        Ok(store)
    }

    async fn conn(&self) -> StoreResult<Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn().await?;
        Ok(conn.get(key).await?)
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        conn.set::<_, _, ()>(key, value).await?;
        Ok(())
    }

    async fn del(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        let removed: usize = conn.del(key).await?;
        Ok(removed > 0)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        let ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        Ok(conn.pexpire(key, ms).await?)
    }

    async fn hget_all(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        let mut conn = self.conn().await?;
        Ok(conn.hgetall(key).await?)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        conn.hset::<_, _, _, ()>(key, field, value).await?;
        Ok(())
    }

    async fn hset_multiple(&self, key: &str, fields: &[(String, String)]) -> StoreResult<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn().await?;
        conn.hset_multiple::<_, _, _, ()>(key, fields).await?;
        Ok(())
    }

    async fn hincr_by(&self, key: &str, field: &str, delta: i64) -> StoreResult<i64> {
        let mut conn = self.conn().await?;
        Ok(conn.hincr(key, field, delta).await?)
    }

    async fn sadd(&self, key: &str, members: &[String]) -> StoreResult<usize> {
        if members.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn().await?;
        Ok(conn.sadd(key, members.to_vec()).await?)
    }

    async fn srem(&self, key: &str, members: &[String]) -> StoreResult<usize> {
        if members.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn().await?;
        Ok(conn.srem(key, members.to_vec()).await?)
    }

    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.conn().await?;
        Ok(conn.smembers(key).await?)
    }

    async fn lpush(&self, key: &str, value: &str) -> StoreResult<usize> {
        let mut conn = self.conn().await?;
        Ok(conn.lpush(key, value).await?)
    }

    async fn ltrim(&self, key: &str, start: isize, stop: isize) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        conn.ltrim::<_, ()>(key, start, stop).await?;
        Ok(())
    }

    async fn lrange(&self, key: &str, start: isize, stop: isize) -> StoreResult<Vec<String>> {
        let mut conn = self.conn().await?;
        Ok(conn.lrange(key, start, stop).await?)
    }
}

//! Short-TTL keyed cache used for dedup debounce windows and idempotency
//! tombstones, generalized behind a trait so the ingestion and
//! escalation services can be tested without Redis.

use anyhow::Result;
use async_trait::async_trait;
use redis::{AsyncCommands, Client};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

pub mod rate_limit;
pub use rate_limit::{RateLimitConfig, SlidingWindowRateLimiter};

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub redis_url: String,
    pub default_ttl_seconds: usize,
    pub prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            default_ttl_seconds: 300,
            prefix: "beacon:".to_string(),
        }
    }
}

#[async_trait]
pub trait KeyedCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
    /// Atomically sets `key` only if absent, returning `true` when this
    /// call won the race — the primitive behind idempotency tombstones
    /// and the webhook dedup debounce window.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;
    async fn invalidate(&self, key: &str) -> Result<()>;
}

pub struct RedisCache {
    client: Client,
    prefix: String,
}

impl RedisCache {
    pub fn new(config: CacheConfig) -> Result<Self> {
        let client = Client::open(config.redis_url)?;
        Ok(Self { client, prefix: config.prefix })
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

#[async_trait]
impl KeyedCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.client.get_tokio_connection_manager().await?;
        let value: Option<String> = conn.get(self.namespaced(key)).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.client.get_tokio_connection_manager().await?;
        let _: () = conn.set_ex(self.namespaced(key), value, ttl.as_secs().max(1)).await?;
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.client.get_tokio_connection_manager().await?;
        let result: Option<String> = redis::cmd("SET")
            .arg(self.namespaced(key))
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await?;
        Ok(result.is_some())
    }

    async fn invalidate(&self, key: &str) -> Result<()> {
        let mut conn = self.client.get_tokio_connection_manager().await?;
        let _: () = conn.del(self.namespaced(key)).await?;
        Ok(())
    }
}

/// In-process cache for tests and for the in-memory service wiring used
/// by the integration test suites.
#[derive(Default)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<String, (String, Instant)>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    async fn prune_if_expired(&self, key: &str) {
        let expired = self
            .entries
            .read()
            .await
            .get(key)
            .map(|(_, expires_at)| Instant::now() >= *expires_at)
            .unwrap_or(false);
        if expired {
            self.entries.write().await.remove(key);
        }
    }
}

#[async_trait]
impl KeyedCache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.prune_if_expired(key).await;
        Ok(self.entries.read().await.get(key).map(|(v, _)| v.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        self.prune_if_expired(key).await;
        let mut entries = self.entries.write().await;
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(true)
    }

    async fn invalidate(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

pub type SharedCache = Arc<dyn KeyedCache>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_if_absent_only_wins_once() {
        let cache = InMemoryCache::new();
        assert!(cache.set_if_absent("fp-1", "owner-a", Duration::from_secs(60)).await.unwrap());
        assert!(!cache.set_if_absent("fp-1", "owner-b", Duration::from_secs(60)).await.unwrap());
        assert_eq!(cache.get("fp-1").await.unwrap().as_deref(), Some("owner-a"));
    }

    #[tokio::test]
    async fn expired_entries_are_pruned_on_access() {
        let cache = InMemoryCache::new();
        cache.set("fp-2", "v", Duration::from_millis(10)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.get("fp-2").await.unwrap(), None);
    }
}

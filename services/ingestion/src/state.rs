use std::sync::Arc;
use std::time::Duration;

use beacon_cache::{RateLimitConfig, SharedCache, SlidingWindowRateLimiter};
use beacon_queue::{Job, SharedJobQueue};
use beacon_routing::Router;
use beacon_store::{AlertRepository, IntegrationRepository, WebhookDeliveryRepository};
use beacon_store::IncidentStore;
use beacon_utils::AppConfig;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Deduplicator job payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupeJob {
    pub alert_id: Uuid,
}

pub type DedupeQueueJob = Job<DedupeJob>;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub integrations: Arc<IntegrationRepository>,
    pub alerts: Arc<AlertRepository>,
    pub deliveries: Arc<WebhookDeliveryRepository>,
    pub incidents: Arc<dyn IncidentStore>,
    pub router: Arc<Router>,
    pub cache: SharedCache,
    pub dedupe_queue: SharedJobQueue<DedupeJob>,
    pub lifecycle_queue: SharedJobQueue<beacon_models::lifecycle::LifecycleEvent>,
    pub config: AppConfig,
}

impl AppState {
    /// Sliding-window limiter for the webhook ingress tier.
    pub fn webhook_rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig { max_requests: self.config.rate_limits.webhook_per_minute_per_ip as u64, window: Duration::from_secs(60) }
    }

    pub fn rate_limiter(&self) -> SlidingWindowRateLimiter {
        SlidingWindowRateLimiter::new(self.cache.clone())
    }
}

//! Provider registry: abstract handles for outbound channels keyed by
//! `NotificationChannelKind`, with per-channel latency tracking used as
//! the health/latency probe outbound channels are expected to expose.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use beacon_models::NotificationChannelKind;
use beacon_utils::BeaconResult;
use tokio::sync::RwLock;

use crate::channel::{NotificationChannel, SendOutcome, SendPayload};

#[derive(Debug, Clone, Copy, Default)]
pub struct LatencyStats {
    pub samples: u64,
    pub total_millis: u64,
    pub last_failed: bool,
}

impl LatencyStats {
    pub fn average_millis(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            self.total_millis as f64 / self.samples as f64
        }
    }
}

#[derive(Default)]
pub struct ProviderRegistry {
    channels: HashMap<NotificationChannelKind, Arc<dyn NotificationChannel>>,
    stats: RwLock<HashMap<NotificationChannelKind, LatencyStats>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: NotificationChannelKind, channel: Arc<dyn NotificationChannel>) {
        self.channels.insert(kind, channel);
    }

    pub fn get(&self, kind: NotificationChannelKind) -> Option<Arc<dyn NotificationChannel>> {
        self.channels.get(&kind).cloned()
    }

    pub fn available_kinds(&self) -> Vec<NotificationChannelKind> {
        self.channels.keys().copied().collect()
    }

    /// Sends through the channel registered for `kind`, recording send
    /// latency for the health probe. Channel-internal failover (SMS's
    /// provider pool, every channel's circuit breaker) already happened
    /// by the time this returns.
    pub async fn send(&self, kind: NotificationChannelKind, payload: &SendPayload) -> BeaconResult<SendOutcome> {
        let channel = self
            .get(kind)
            .ok_or_else(|| beacon_utils::BeaconError::not_found(format!("no provider registered for channel {kind}")))?;

        let started = Instant::now();
        let outcome = channel.send(payload).await;
        let elapsed_millis = started.elapsed().as_millis() as u64;

        let mut stats = self.stats.write().await;
        let entry = stats.entry(kind).or_default();
        entry.samples += 1;
        entry.total_millis += elapsed_millis;
        entry.last_failed = outcome.is_err();

        outcome
    }

    pub async fn health(&self, kind: NotificationChannelKind) -> LatencyStats {
        self.stats.read().await.get(&kind).copied().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct StubChannel;

    #[async_trait]
    impl NotificationChannel for StubChannel {
        fn name(&self) -> &str {
            "stub"
        }

        async fn send(&self, _payload: &SendPayload) -> BeaconResult<SendOutcome> {
            Ok(SendOutcome::ok("stub-provider"))
        }
    }

    #[tokio::test]
    async fn send_records_latency_stats() {
        let mut registry = ProviderRegistry::new();
        registry.register(NotificationChannelKind::Email, Arc::new(StubChannel));

        let payload = SendPayload {
            recipient: "oncall@example.com".to_string(),
            subject: "page".to_string(),
            body: "body".to_string(),
            metadata: serde_json::json!({}),
        };
        registry.send(NotificationChannelKind::Email, &payload).await.unwrap();

        let health = registry.health(NotificationChannelKind::Email).await;
        assert_eq!(health.samples, 1);
        assert!(!health.last_failed);
    }

    #[tokio::test]
    async fn send_to_unregistered_kind_returns_not_found() {
        let registry = ProviderRegistry::new();
        let payload = SendPayload {
            recipient: "x".to_string(),
            subject: "x".to_string(),
            body: "x".to_string(),
            metadata: serde_json::json!({}),
        };
        let result = registry.send(NotificationChannelKind::Sms, &payload).await;
        assert!(result.is_err());
    }
}

//! Mobile push channel. Single breaker-gated provider abstraction, no
//! inbound replies — push notifications are the one tier channel the
//! spec doesn't treat as interactive.

use async_trait::async_trait;
use beacon_utils::{BeaconError, BeaconResult};
use reqwest::Client;
use serde::Serialize;

use crate::channel::{NotificationChannel, SendOutcome, SendPayload};
use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};

#[derive(Debug, Clone)]
pub struct PushProviderConfig {
    pub name: String,
    pub api_base: String,
    pub auth_token: String,
}

#[derive(Serialize)]
struct PushRequest<'a> {
    device_token: &'a str,
    title: &'a str,
    body: &'a str,
}

pub struct PushChannel {
    config: PushProviderConfig,
    breaker: CircuitBreaker,
    http: Client,
}

impl PushChannel {
    pub fn new(config: PushProviderConfig, breaker_config: CircuitBreakerConfig) -> Self {
        Self { config, breaker: CircuitBreaker::new(breaker_config), http: Client::new() }
    }
}

#[async_trait]
impl NotificationChannel for PushChannel {
    fn name(&self) -> &str {
        "push"
    }

    async fn send(&self, payload: &SendPayload) -> BeaconResult<SendOutcome> {
        let result = self
            .breaker
            .call(|| async {
                let response = self
                    .http
                    .post(format!("{}/notifications", self.config.api_base))
                    .bearer_auth(&self.config.auth_token)
                    .json(&PushRequest { device_token: &payload.recipient, title: &payload.subject, body: &payload.body })
                    .send()
                    .await
                    .map_err(|e| e.to_string())?;

                if response.status().is_success() {
                    Ok(self.config.name.clone())
                } else {
                    Err(format!("push provider returned {}", response.status()))
                }
            })
            .await;

        match result {
            Ok(provider_id) => Ok(SendOutcome::ok(provider_id)),
            Err(CircuitBreakerError::Open) => Err(BeaconError::transient("push provider circuit open")),
            Err(CircuitBreakerError::Inner(msg)) => Err(BeaconError::transient(msg)),
        }
    }
}

//! Chat channel (Slack/Teams-style). Posts a message to a per-user or
//! per-channel webhook URL; inbound interactive buttons ("Acknowledge"/
//! "Resolve") arrive as verified provider callbacks.

use async_trait::async_trait;
use beacon_utils::{BeaconError, BeaconResult};
use reqwest::Client;
use serde::Serialize;

use crate::channel::{NotificationChannel, SendOutcome, SendPayload};
use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};

#[derive(Debug, Clone)]
pub struct ChatProviderConfig {
    pub name: String,
    pub api_base: String,
    pub auth_token: String,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    channel: &'a str,
    text: &'a str,
}

pub struct ChatChannel {
    config: ChatProviderConfig,
    breaker: CircuitBreaker,
    http: Client,
}

impl ChatChannel {
    pub fn new(config: ChatProviderConfig, breaker_config: CircuitBreakerConfig) -> Self {
        Self { config, breaker: CircuitBreaker::new(breaker_config), http: Client::new() }
    }
}

#[async_trait]
impl NotificationChannel for ChatChannel {
    fn name(&self) -> &str {
        "chat"
    }

    fn supports_inbound(&self) -> bool {
        true
    }

    async fn send(&self, payload: &SendPayload) -> BeaconResult<SendOutcome> {
        let result = self
            .breaker
            .call(|| async {
                let response = self
                    .http
                    .post(format!("{}/chat.postMessage", self.config.api_base))
                    .bearer_auth(&self.config.auth_token)
                    .json(&ChatMessage { channel: &payload.recipient, text: &payload.body })
                    .send()
                    .await
                    .map_err(|e| e.to_string())?;

                if response.status().is_success() {
                    Ok(self.config.name.clone())
                } else {
                    Err(format!("chat provider returned {}", response.status()))
                }
            })
            .await;

        match result {
            Ok(provider_id) => Ok(SendOutcome::ok(provider_id)),
            Err(CircuitBreakerError::Open) => Err(BeaconError::transient("chat provider circuit open")),
            Err(CircuitBreakerError::Inner(msg)) => Err(BeaconError::transient(msg)),
        }
    }
}

//! Voice channel (IVR call-out). Concrete telephony SDK integration is
//! out of scope here; this models the abstract provider interface: a
//! single breaker-gated HTTP provider that places the call and lets the
//! provider's own webhook report delivery.

use async_trait::async_trait;
use beacon_utils::{BeaconError, BeaconResult};
use reqwest::Client;
use serde::Serialize;

use crate::channel::{NotificationChannel, SendOutcome, SendPayload};
use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};

#[derive(Debug, Clone)]
pub struct VoiceProviderConfig {
    pub name: String,
    pub api_base: String,
    pub auth_token: String,
    pub from_number: String,
}

#[derive(Serialize)]
struct VoiceRequest<'a> {
    from: &'a str,
    to: &'a str,
    message: &'a str,
}

pub struct VoiceChannel {
    config: VoiceProviderConfig,
    breaker: CircuitBreaker,
    http: Client,
}

impl VoiceChannel {
    pub fn new(config: VoiceProviderConfig, breaker_config: CircuitBreakerConfig) -> Self {
        Self { config, breaker: CircuitBreaker::new(breaker_config), http: Client::new() }
    }
}

#[async_trait]
impl NotificationChannel for VoiceChannel {
    fn name(&self) -> &str {
        "voice"
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
                    .post(format!("{}/calls", self.config.api_base))
                    .bearer_auth(&self.config.auth_token)
                    .json(&VoiceRequest { from: &self.config.from_number, to: &payload.recipient, message: &payload.body })
                    .send()
                    .await
                    .map_err(|e| e.to_string())?;

                if response.status().is_success() {
                    Ok(self.config.name.clone())
                } else {
                    Err(format!("voice provider returned {}", response.status()))
                }
            })
            .await;

        match result {
            Ok(provider_id) => Ok(SendOutcome::ok(provider_id)),
            Err(CircuitBreakerError::Open) => Err(BeaconError::transient("voice provider circuit open")),
            Err(CircuitBreakerError::Inner(msg)) => Err(BeaconError::transient(msg)),
        }
    }
}

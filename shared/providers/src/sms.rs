//! SMS channel with a `[Primary, Secondary]` provider pool, each gated by
//! its own circuit breaker. `Send` tries the primary
//! unless its breaker is open, falls back to the secondary on failure,
//! and returns `AllProvidersFailed` only once both have failed.

use async_trait::async_trait;
use beacon_utils::{BeaconError, BeaconResult};
use reqwest::Client;
use serde::Serialize;

use crate::channel::{NotificationChannel, SendOutcome, SendPayload};
use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};

#[derive(Debug, Clone)]
pub struct SmsProviderConfig {
    pub name: String,
    pub api_base: String,
    pub auth_token: String,
    pub from_number: String,
}

struct SmsProvider {
    config: SmsProviderConfig,
    breaker: CircuitBreaker,
    http: Client,
}

#[derive(Serialize)]
struct SmsRequest<'a> {
    from: &'a str,
    to: &'a str,
    body: &'a str,
}

/// SMS bodies are capped at this many UTF-16 code units, the GSM/Unicode
/// single-segment SMS limit.
const MAX_SMS_BODY_LEN: usize = 160;

/// Truncates `body` to at most [`MAX_SMS_BODY_LEN`] UTF-16 code units,
/// respecting `char` boundaries so the result is always valid UTF-8.
fn truncate_sms_body(body: &str) -> String {
    if body.encode_utf16().count() <= MAX_SMS_BODY_LEN {
        return body.to_string();
    }
    let mut units = 0usize;
    let mut end = body.len();
    for (idx, ch) in body.char_indices() {
        units += ch.len_utf16();
        if units > MAX_SMS_BODY_LEN {
            end = idx;
            break;
        }
    }
    body[..end].to_string()
}

impl SmsProvider {
    fn new(config: SmsProviderConfig, breaker_config: CircuitBreakerConfig, http: Client) -> Self {
        Self { config, breaker: CircuitBreaker::new(breaker_config), http }
    }

    async fn dispatch(&self, payload: &SendPayload) -> BeaconResult<SendOutcome> {
        let body = truncate_sms_body(&payload.body);
        let result = self
            .breaker
            .call(|| async {
                let response = self
                    .http
                    .post(format!("{}/messages", self.config.api_base))
                    .bearer_auth(&self.config.auth_token)
                    .json(&SmsRequest { from: &self.config.from_number, to: &payload.recipient, body: &body })
                    .send()
                    .await
                    .map_err(|e| e.to_string())?;

                if response.status().is_success() {
                    Ok(self.config.name.clone())
                } else {
                    Err(format!("provider {} returned {}", self.config.name, response.status()))
                }
            })
            .await;

        match result {
            Ok(provider_id) => Ok(SendOutcome::ok(provider_id)),
            Err(CircuitBreakerError::Open) => Err(BeaconError::transient(format!("provider {} circuit open", self.config.name))),
            Err(CircuitBreakerError::Inner(msg)) => Err(BeaconError::transient(msg)),
        }
    }
}

pub struct SmsChannel {
    providers: Vec<SmsProvider>,
}

impl SmsChannel {
    pub fn new(configs: Vec<SmsProviderConfig>, breaker_config: CircuitBreakerConfig) -> Self {
        let http = Client::new();
        let providers = configs.into_iter().map(|c| SmsProvider::new(c, breaker_config, http.clone())).collect();
        Self { providers }
    }
}

#[async_trait]
impl NotificationChannel for SmsChannel {
    fn name(&self) -> &str {
        "sms"
    }

    fn supports_inbound(&self) -> bool {
        true
    }

    async fn send(&self, payload: &SendPayload) -> BeaconResult<SendOutcome> {
        let mut last_error = None;
        for provider in &self.providers {
            match provider.dispatch(payload).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) => last_error = Some(e),
            }
        }
        Err(BeaconError::transient(format!(
            "all SMS providers failed: {}",
            last_error.map(|e| e.to_string()).unwrap_or_else(|| "no providers configured".to_string())
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_name_is_sms_and_supports_inbound() {
        let channel = SmsChannel::new(vec![], CircuitBreakerConfig::default());
        assert_eq!(channel.name(), "sms");
        assert!(channel.supports_inbound());
    }

    #[test]
    fn short_body_is_unchanged() {
        let body = "Incident ack required";
        assert_eq!(truncate_sms_body(body), body);
    }

    #[test]
    fn long_body_is_truncated_to_160_code_units_on_a_char_boundary() {
        let body = "x".repeat(500);
        let truncated = truncate_sms_body(&body);
        assert_eq!(truncated.encode_utf16().count(), MAX_SMS_BODY_LEN);
    }

    #[test]
    fn truncation_never_splits_a_multibyte_character() {
        let body = format!("{}{}", "a".repeat(159), "\u{1F600}");
        let truncated = truncate_sms_body(&body);
        assert!(truncated.encode_utf16().count() <= MAX_SMS_BODY_LEN);
        assert!(std::str::from_utf8(truncated.as_bytes()).is_ok());
    }
}

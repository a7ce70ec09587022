//! Delivery contract every outbound channel implements, so email, SMS,
//! voice, push, and chat channels share one shape the dispatcher can
//! drive uniformly.

use async_trait::async_trait;
use beacon_utils::BeaconResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendPayload {
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendOutcome {
    pub success: bool,
    pub provider_id: Option<String>,
    pub error: Option<String>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl SendOutcome {
    pub fn ok(provider_id: impl Into<String>) -> Self {
        Self { success: true, provider_id: Some(provider_id.into()), error: None, delivered_at: Some(Utc::now()) }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self { success: false, provider_id: None, error: Some(error.into()), delivered_at: None }
    }
}

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &str;

    /// Sends `payload`. Transport failures should surface as a
    /// `BeaconError::Transient` so the dispatcher's retry loop knows to reattempt with backoff.
    async fn send(&self, payload: &SendPayload) -> BeaconResult<SendOutcome>;

    /// Channels that support interactive replies (chat, SMS, voice IVR)
    /// override this to translate a verified inbound provider webhook
    /// into an acknowledge/resolve intent. Non-interactive channels accept the
    /// default `false`.
    fn supports_inbound(&self) -> bool {
        false
    }
}

//! Alert domain model — one event from a monitoring source.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "INFO" => Some(Self::Info),
            "LOW" => Some(Self::Low),
            "MEDIUM" => Some(Self::Medium),
            "HIGH" => Some(Self::High),
            "CRITICAL" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertStatus {
    Open,
    Resolved,
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "OPEN"),
            Self::Resolved => write!(f, "RESOLVED"),
        }
    }
}

impl AlertStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "OPEN" => Some(Self::Open),
            "RESOLVED" => Some(Self::Resolved),
            _ => None,
        }
    }
}

crate::impl_pg_string_enum!(Severity, Severity::parse);
crate::impl_pg_string_enum!(AlertStatus, AlertStatus::parse);

/// Normalized alert metadata. Extracted fields are typed; everything else
/// an integration adapter does not recognize is preserved in `extra` so it
/// can still be referenced by workflow template interpolation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertMetadata {
    pub routing_key: Option<String>,
    pub service_name: Option<String>,
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl AlertMetadata {
    /// Looks up an unrecognized field by name for template interpolation.
    /// Typed fields (`routing_key`, `service_name`) are not reachable here.
    pub fn get(&self, path: &str) -> Option<&serde_json::Value> {
        self.extra.get(path)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Alert {
    pub id: Uuid,
    pub integration_id: Uuid,
    pub title: String,
    pub severity: Severity,
    pub status: AlertStatus,
    pub fingerprint: String,
    pub metadata: Json<AlertMetadata>,
    pub external_id: Option<String>,
    pub received_at: DateTime<Utc>,
    pub incident_id: Option<Uuid>,
}

impl Alert {
    pub fn new(
        integration_id: Uuid,
        title: String,
        severity: Severity,
        fingerprint: String,
        metadata: AlertMetadata,
        external_id: Option<String>,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            integration_id,
            title,
            severity,
            status: AlertStatus::Open,
            fingerprint,
            metadata: Json(metadata),
            external_id,
            received_at,
            incident_id: None,
        }
    }
}

/// Record of one inbound webhook delivery, persisted regardless of outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct WebhookDelivery {
    pub id: Uuid,
    pub integration_id: Option<Uuid>,
    pub integration_name: String,
    pub status_code: i32,
    pub latency_ms: i64,
    pub bytes: i64,
    pub outcome: String,
    pub received_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_parses_case_insensitively() {
        assert_eq!(Severity::parse("critical"), Some(Severity::Critical));
        assert_eq!(Severity::parse("CRITICAL"), Some(Severity::Critical));
        assert_eq!(Severity::parse("bogus"), None);
    }

    #[test]
    fn alert_starts_open_and_unlinked() {
        let alert = Alert::new(
            Uuid::new_v4(),
            "disk full".into(),
            Severity::High,
            "fp-1".into(),
            AlertMetadata::default(),
            None,
            Utc::now(),
        );
        assert_eq!(alert.status, AlertStatus::Open);
        assert!(alert.incident_id.is_none());
    }
}

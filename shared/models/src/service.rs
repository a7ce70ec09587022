//! Service domain model — the thing being monitored, and its binding to
//! an escalation policy and the set of integrations allowed to page it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceStatus {
    Active,
    Deprecated,
    Archived,
}

impl std::fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "ACTIVE"),
            Self::Deprecated => write!(f, "DEPRECATED"),
            Self::Archived => write!(f, "ARCHIVED"),
        }
    }
}

impl ServiceStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(Self::Active),
            "DEPRECATED" => Some(Self::Deprecated),
            "ARCHIVED" => Some(Self::Archived),
            _ => None,
        }
    }

    /// Only non-ARCHIVED services are routable.
    pub fn is_routable(&self) -> bool {
        !matches!(self, Self::Archived)
    }
}

crate::impl_pg_string_enum!(ServiceStatus, ServiceStatus::parse);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, Validate)]
pub struct Service {
    pub id: Uuid,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub description: Option<String>,
    /// Unique routing target an alert's metadata can carry directly.
    pub routing_key: String,
    pub team_id: Uuid,
    /// Falls back to the team's `default_escalation_policy_id` when unset.
    pub escalation_policy_id: Option<Uuid>,
    pub status: ServiceStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignatureAlgorithm {
    Sha256,
    Sha1,
}

impl std::fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sha256 => write!(f, "SHA256"),
            Self::Sha1 => write!(f, "SHA1"),
        }
    }
}

impl SignatureAlgorithm {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SHA256" => Some(Self::Sha256),
            "SHA1" => Some(Self::Sha1),
            _ => None,
        }
    }
}

crate::impl_pg_string_enum!(SignatureAlgorithm, SignatureAlgorithm::parse);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignatureFormat {
    Hex,
    Base64,
}

impl std::fmt::Display for SignatureFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hex => write!(f, "HEX"),
            Self::Base64 => write!(f, "BASE64"),
        }
    }
}

impl SignatureFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "HEX" => Some(Self::Hex),
            "BASE64" => Some(Self::Base64),
            _ => None,
        }
    }
}

crate::impl_pg_string_enum!(SignatureFormat, SignatureFormat::parse);

/// Maps an inbound integration (e.g. a specific Datadog or Prometheus
/// webhook) onto the service it pages, and carries the per-integration
/// signature verification config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, Validate)]
pub struct Integration {
    pub id: Uuid,
    pub service_id: Uuid,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub provider: String,
    pub webhook_secret: String,
    pub signature_header: String,
    pub signature_algorithm: SignatureAlgorithm,
    pub signature_format: SignatureFormat,
    /// Minutes; clamped to [1, 120] at creation time, default 15.
    pub dedup_window_minutes: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Integration {
    pub fn clamp_dedup_window(minutes: i32) -> i32 {
        minutes.clamp(1, 120)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[test]
    fn service_name_cannot_be_empty() {
        let service = Service {
            id: Uuid::new_v4(),
            name: "".into(),
            description: None,
            routing_key: "svc-key".into(),
            team_id: Uuid::new_v4(),
            escalation_policy_id: Some(Uuid::new_v4()),
            status: ServiceStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(service.validate().is_err());
    }

    #[test]
    fn archived_service_is_not_routable() {
        assert!(!ServiceStatus::Archived.is_routable());
        assert!(ServiceStatus::Active.is_routable());
        assert!(ServiceStatus::Deprecated.is_routable());
    }

    #[test]
    fn dedup_window_clamps_to_configured_bounds() {
        assert_eq!(Integration::clamp_dedup_window(0), 1);
        assert_eq!(Integration::clamp_dedup_window(15), 15);
        assert_eq!(Integration::clamp_dedup_window(500), 120);
    }
}

//! Notification dispatch log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::team::NotificationChannelKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationStatus {
    Pending,
    Sent,
    Delivered,
    Failed,
}

/// Which channel set a notification belongs to.
/// Tiers fall through on failure: primary -> secondary -> tertiary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationTier {
    Primary,
    Secondary,
    Tertiary,
}

impl std::fmt::Display for NotificationTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Primary => write!(f, "PRIMARY"),
            Self::Secondary => write!(f, "SECONDARY"),
            Self::Tertiary => write!(f, "TERTIARY"),
        }
    }
}

impl NotificationTier {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PRIMARY" => Some(Self::Primary),
            "SECONDARY" => Some(Self::Secondary),
            "TERTIARY" => Some(Self::Tertiary),
            _ => None,
        }
    }

    /// The tier escalated to after this one fails, if any.
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Primary => Some(Self::Secondary),
            Self::Secondary => Some(Self::Tertiary),
            Self::Tertiary => None,
        }
    }
}

impl std::fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Sent => write!(f, "SENT"),
            Self::Delivered => write!(f, "DELIVERED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

impl NotificationStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "SENT" => Some(Self::Sent),
            "DELIVERED" => Some(Self::Delivered),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Legal forward transitions along `PENDING -> SENT -> DELIVERED`,
    /// with `FAILED` reachable from any non-terminal state. `DELIVERED`
    /// and `FAILED` are both terminal - a late reconciliation event that
    /// names either as the *prior* state never advances.
    pub fn can_transition_to(&self, next: NotificationStatus) -> bool {
        use NotificationStatus::*;
        matches!((self, next), (Pending, Sent) | (Pending, Failed) | (Sent, Delivered) | (Sent, Failed))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Failed)
    }
}

crate::impl_pg_string_enum!(NotificationStatus, NotificationStatus::parse);
crate::impl_pg_string_enum!(crate::team::NotificationChannelKind, crate::team::NotificationChannelKind::parse);
crate::impl_pg_string_enum!(NotificationTier, NotificationTier::parse);

/// One attempt to reach one recipient over one channel for one escalation
/// level. The dispatcher fans these out in parallel and records the
/// provider actually used, so failover is auditable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct NotificationLog {
    pub id: Uuid,
    pub incident_id: Uuid,
    pub escalation_level: i32,
    pub recipient_id: Uuid,
    pub tier: NotificationTier,
    pub channel: NotificationChannelKind,
    pub provider: String,
    pub status: NotificationStatus,
    pub attempt: i32,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl NotificationLog {
    pub fn pending(
        incident_id: Uuid,
        escalation_level: i32,
        recipient_id: Uuid,
        tier: NotificationTier,
        channel: NotificationChannelKind,
        provider: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            incident_id,
            escalation_level,
            recipient_id,
            tier,
            channel,
            provider,
            status: NotificationStatus::Pending,
            attempt: 1,
            sent_at: None,
            delivered_at: None,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_falls_through_in_order() {
        assert_eq!(NotificationTier::Primary.next(), Some(NotificationTier::Secondary));
        assert_eq!(NotificationTier::Secondary.next(), Some(NotificationTier::Tertiary));
        assert_eq!(NotificationTier::Tertiary.next(), None);
    }

    #[test]
    fn terminal_states_accept_no_further_transition() {
        for next in [NotificationStatus::Pending, NotificationStatus::Sent, NotificationStatus::Delivered, NotificationStatus::Failed] {
            assert!(!NotificationStatus::Delivered.can_transition_to(next));
            assert!(!NotificationStatus::Failed.can_transition_to(next));
        }
        assert!(NotificationStatus::Delivered.is_terminal());
        assert!(NotificationStatus::Failed.is_terminal());
        assert!(!NotificationStatus::Pending.is_terminal());
        assert!(!NotificationStatus::Sent.is_terminal());
    }

    #[test]
    fn pending_and_sent_allow_only_their_spec_defined_advances() {
        assert!(NotificationStatus::Pending.can_transition_to(NotificationStatus::Sent));
        assert!(NotificationStatus::Pending.can_transition_to(NotificationStatus::Failed));
        assert!(!NotificationStatus::Pending.can_transition_to(NotificationStatus::Delivered));
        assert!(NotificationStatus::Sent.can_transition_to(NotificationStatus::Delivered));
        assert!(NotificationStatus::Sent.can_transition_to(NotificationStatus::Failed));
        assert!(!NotificationStatus::Sent.can_transition_to(NotificationStatus::Pending));
    }
}

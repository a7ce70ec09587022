//! Team and membership models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, Validate)]
pub struct Team {
    pub id: Uuid,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    /// Free-text label matched against an alert's `service`/`service_name`
    /// metadata field for the TeamTag routing fallback, used only when neither a `routing_key` nor an integration
    /// default service resolves the alert to a `Service`.
    pub tag: Option<String>,
    pub default_escalation_policy_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TeamMemberRole {
    Observer,
    Responder,
    TeamAdmin,
}

impl std::fmt::Display for TeamMemberRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Observer => write!(f, "OBSERVER"),
            Self::Responder => write!(f, "RESPONDER"),
            Self::TeamAdmin => write!(f, "TEAM_ADMIN"),
        }
    }
}

impl TeamMemberRole {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "OBSERVER" => Some(Self::Observer),
            "RESPONDER" => Some(Self::Responder),
            "TEAM_ADMIN" => Some(Self::TeamAdmin),
            _ => None,
        }
    }

    /// Only RESPONDER / TEAM_ADMIN are eligible on-call targets.
    pub fn is_eligible_oncall(&self) -> bool {
        matches!(self, Self::Responder | Self::TeamAdmin)
    }
}

crate::impl_pg_string_enum!(TeamMemberRole, TeamMemberRole::parse);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationChannelKind {
    Email,
    Sms,
    Voice,
    Push,
    Slack,
}

impl std::fmt::Display for NotificationChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Email => write!(f, "EMAIL"),
            Self::Sms => write!(f, "SMS"),
            Self::Voice => write!(f, "VOICE"),
            Self::Push => write!(f, "PUSH"),
            Self::Slack => write!(f, "SLACK"),
        }
    }
}

impl NotificationChannelKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "EMAIL" => Some(Self::Email),
            "SMS" => Some(Self::Sms),
            "VOICE" => Some(Self::Voice),
            "PUSH" => Some(Self::Push),
            "SLACK" => Some(Self::Slack),
            _ => None,
        }
    }
}

/// One contact method for a team member, ordered within a channel kind so
/// the dispatcher's provider-failover logic has a
/// deterministic primary/secondary preference per kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactMethod {
    pub kind: NotificationChannelKind,
    pub address: String,
    pub priority: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, Validate)]
pub struct TeamMember {
    pub id: Uuid,
    pub team_id: Uuid,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    pub phone: Option<String>,
    pub contact_methods: Json<Vec<ContactMethod>>,
    pub timezone: String,
    pub role: TeamMemberRole,
    pub is_active: bool,
    pub joined_at: DateTime<Utc>,
}

impl TeamMember {
    pub fn contacts_for(&self, kind: NotificationChannelKind) -> Vec<&ContactMethod> {
        let mut matches: Vec<&ContactMethod> =
            self.contact_methods.0.iter().filter(|c| c.kind == kind).collect();
        matches.sort_by_key(|c| c.priority);
        matches
    }

    /// Eligible as an on-call / entire-team target.
    pub fn is_eligible_oncall(&self) -> bool {
        self.is_active && self.role.is_eligible_oncall()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contacts_for_kind_are_priority_ordered() {
        let member = TeamMember {
            id: Uuid::new_v4(),
            team_id: Uuid::new_v4(),
            name: "Jo".into(),
            email: "jo@example.com".into(),
            phone: None,
            contact_methods: Json(vec![
                ContactMethod { kind: NotificationChannelKind::Sms, address: "+1222".into(), priority: 2 },
                ContactMethod { kind: NotificationChannelKind::Sms, address: "+1111".into(), priority: 1 },
            ]),
            timezone: "UTC".into(),
            role: TeamMemberRole::Responder,
            is_active: true,
            joined_at: Utc::now(),
        };
        let contacts = member.contacts_for(NotificationChannelKind::Sms);
        assert_eq!(contacts[0].address, "+1111");
    }
}

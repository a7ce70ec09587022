//! Escalation policy models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EscalationTargetKind {
    User,
    Schedule,
    /// Targets every active RESPONDER/TEAM_ADMIN on the team; resolved to
    /// the earliest-joined one.
    EntireTeam,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationTarget {
    pub kind: EscalationTargetKind,
    /// Required unless `kind == EntireTeam`.
    pub target_id: Option<Uuid>,
}

/// One rung of an escalation policy: who is paged and how long the
/// engine waits for an ack before moving to the next level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct EscalationLevel {
    pub id: Uuid,
    pub escalation_policy_id: Uuid,
    pub level_index: i32,
    pub targets: serde_json::Value,
    pub timeout_minutes: i32,
}

impl EscalationLevel {
    pub fn parsed_targets(&self) -> Vec<EscalationTarget> {
        serde_json::from_value(self.targets.clone()).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, Validate)]
pub struct EscalationPolicy {
    pub id: Uuid,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub team_id: Uuid,
    /// Repeat the whole level sequence this many times before giving up
    /// and leaving the incident at its final level.
    pub repeat_limit: i32,
    pub is_active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn targets_round_trip_through_json() {
        let target = EscalationTarget { kind: EscalationTargetKind::User, target_id: Some(Uuid::new_v4()) };
        let level = EscalationLevel {
            id: Uuid::new_v4(),
            escalation_policy_id: Uuid::new_v4(),
            level_index: 0,
            targets: serde_json::to_value(vec![&target]).unwrap(),
            timeout_minutes: 15,
        };
        let parsed = level.parsed_targets();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].target_id, target.target_id);
    }
}

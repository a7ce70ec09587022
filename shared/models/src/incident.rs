//! Incident domain model — the deduplicated, routable unit of work an
//! alert graduates into.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::alert::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IncidentStatus {
    Triggered,
    Acknowledged,
    Resolved,
    /// Terminal state reached only from RESOLVED ("Terminal =
    /// CLOSED"). The escalation engine and dispatcher never target a
    /// CLOSED incident; closing is a separate operator action this crate
    /// models but does not trigger on its own.
    Closed,
}

impl std::fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Triggered => write!(f, "TRIGGERED"),
            Self::Acknowledged => write!(f, "ACKNOWLEDGED"),
            Self::Resolved => write!(f, "RESOLVED"),
            Self::Closed => write!(f, "CLOSED"),
        }
    }
}

impl IncidentStatus {
    /// Valid forward transitions for the escalation state
    /// machine. Resolution is reachable from any state; re-triggering a
    /// resolved incident is handled by the deduplicator creating a new
    /// incident, not by transitioning this one.
    pub fn can_transition_to(&self, next: IncidentStatus) -> bool {
        use IncidentStatus::*;
        matches!(
            (self, next),
            (Triggered, Acknowledged)
                | (Triggered, Resolved)
                | (Acknowledged, Resolved)
                | (Acknowledged, Triggered)
                | (Resolved, Closed)
        )
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Self::Triggered | Self::Acknowledged)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "TRIGGERED" => Some(Self::Triggered),
            "ACKNOWLEDGED" => Some(Self::Acknowledged),
            "RESOLVED" => Some(Self::Resolved),
            "CLOSED" => Some(Self::Closed),
            _ => None,
        }
    }
}

crate::impl_pg_string_enum!(IncidentStatus, IncidentStatus::parse);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Incident {
    pub id: Uuid,
    pub service_id: Uuid,
    pub title: String,
    pub severity: Severity,
    pub status: IncidentStatus,
    pub fingerprint: String,
    pub alert_count: i32,
    pub escalation_policy_id: Uuid,
    pub current_escalation_level: i32,
    /// Which pass through the whole escalation ladder the engine is on
    ///`). Incremented when the ladder is walked again after
    /// `maxLevel` times out without an ack.
    pub current_repeat: i32,
    pub acknowledged_by: Option<Uuid>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<Uuid>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Incident {
    pub fn new(
        service_id: Uuid,
        title: String,
        severity: Severity,
        fingerprint: String,
        escalation_policy_id: Uuid,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            service_id,
            title,
            severity,
            status: IncidentStatus::Triggered,
            fingerprint,
            alert_count: 1,
            escalation_policy_id,
            current_escalation_level: 1,
            current_repeat: 1,
            acknowledged_by: None,
            acknowledged_at: None,
            resolved_by: None,
            resolved_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn acknowledge(&mut self, by: Uuid, now: DateTime<Utc>) -> bool {
        if !self.status.can_transition_to(IncidentStatus::Acknowledged) {
            return false;
        }
        self.status = IncidentStatus::Acknowledged;
        self.acknowledged_by = Some(by);
        self.acknowledged_at = Some(now);
        self.updated_at = now;
        true
    }

    pub fn resolve(&mut self, by: Option<Uuid>, now: DateTime<Utc>) -> bool {
        if self.status == IncidentStatus::Resolved {
            return false;
        }
        self.status = IncidentStatus::Resolved;
        self.resolved_by = by;
        self.resolved_at = Some(now);
        self.updated_at = now;
        true
    }

    /// Re-triggers a previously acknowledged incident when a new alert
    /// arrives for the same fingerprint. A resolved incident is never reopened — a fresh incident
    /// is created for it instead.
    pub fn merge_alert(&mut self, now: DateTime<Utc>) {
        self.alert_count += 1;
        if self.status == IncidentStatus::Acknowledged {
            self.status = IncidentStatus::Triggered;
            self.acknowledged_by = None;
            self.acknowledged_at = None;
        }
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn incident() -> Incident {
        Incident::new(
            Uuid::new_v4(),
            "disk full".into(),
            Severity::High,
            "fp-1".into(),
            Uuid::new_v4(),
            Utc::now(),
        )
    }

    #[test]
    fn acknowledge_then_resolve_is_valid() {
        let mut incident = incident();
        assert!(incident.acknowledge(Uuid::new_v4(), Utc::now()));
        assert!(incident.resolve(Some(Uuid::new_v4()), Utc::now()));
        assert_eq!(incident.status, IncidentStatus::Resolved);
    }

    #[test]
    fn resolved_incident_cannot_be_reacknowledged() {
        let mut incident = incident();
        incident.resolve(None, Utc::now());
        assert!(!incident.acknowledge(Uuid::new_v4(), Utc::now()));
    }

    #[test]
    fn merging_alert_reopens_acknowledged_incident() {
        let mut incident = incident();
        incident.acknowledge(Uuid::new_v4(), Utc::now());
        incident.merge_alert(Utc::now());
        assert_eq!(incident.status, IncidentStatus::Triggered);
        assert_eq!(incident.alert_count, 2);
        assert!(incident.acknowledged_by.is_none());
    }
}

//! Inter-service lifecycle events. These travel over the job queue as a plain event bus rather
//! than belonging to any one aggregate's storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleEventType {
    IncidentCreated,
    IncidentAcknowledged,
    IncidentResolved,
    EscalationExhausted,
    NoteAdded,
    StateChanged,
}

impl LifecycleEventType {
    /// The string the workflow matcher compares a workflow's
    /// `trigger_event` against.
    pub fn trigger_name(&self) -> &'static str {
        match self {
            Self::IncidentCreated => "incident.created",
            Self::IncidentAcknowledged => "incident.acknowledged",
            Self::IncidentResolved => "incident.resolved",
            Self::EscalationExhausted => "incident.escalationExhausted",
            Self::NoteAdded => "note.added",
            Self::StateChanged => "state_changed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub event_type: LifecycleEventType,
    pub incident_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    /// Set only for `StateChanged`; matched against a workflow's
    /// `stateTransition.to` condition.
    pub state_transition_to: Option<String>,
    /// Workflow ids already triggered in this causal chain, oldest first.
    /// Cycle prevention rejects scheduling a workflow already present here
    /// or once `len() >= MAX_DEPTH`.
    pub execution_chain: Vec<Uuid>,
}

impl LifecycleEvent {
    pub fn new(event_type: LifecycleEventType, incident_id: Uuid, occurred_at: DateTime<Utc>) -> Self {
        Self { event_type, incident_id, occurred_at, state_transition_to: None, execution_chain: Vec::new() }
    }

    pub fn with_state_transition(mut self, to: impl Into<String>) -> Self {
        self.state_transition_to = Some(to.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_names_match_spec_event_strings() {
        assert_eq!(LifecycleEventType::IncidentCreated.trigger_name(), "incident.created");
        assert_eq!(LifecycleEventType::StateChanged.trigger_name(), "state_changed");
    }
}

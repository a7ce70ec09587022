//! Job payload shapes shared across service boundaries. Centralized here
//! (rather than duplicated in each consuming crate) so the escalation
//! engine, dispatcher, and workflow engine agree on wire shape without a
//! dependency cycle between their crates.

use beacon_models::notification::NotificationTier;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `escalation_timeout` payload: guarded on dequeue by
/// comparing `(level, repeat)` against the incident's current state, so a
/// stale timer left over from a since-advanced or since-acknowledged
/// incident becomes a silent no-op rather than a double-notify.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationTimeoutJob {
    pub incident_id: Uuid,
    pub level: i32,
    pub repeat: i32,
}

/// `notification_dispatch` payload: one job per
/// `(incident, user, tier)` triple; the dispatcher fans this out across
/// every channel in the tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationDispatchJob {
    pub incident_id: Uuid,
    pub user_id: Uuid,
    pub escalation_level: i32,
    pub tier: NotificationTier,
}

/// `workflow_execution` payload: the matcher has already
/// created the `WorkflowExecution` row with its `definitionSnapshot`, so
/// the executor only needs the execution id to pick up where the matcher
/// left off.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecutionJob {
    pub execution_id: Uuid,
}

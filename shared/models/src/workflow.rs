//! Workflow engine models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowScope {
    Team,
    Global,
}

impl std::fmt::Display for WorkflowScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Team => write!(f, "TEAM"),
            Self::Global => write!(f, "GLOBAL"),
        }
    }
}

impl WorkflowScope {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "TEAM" => Some(Self::Team),
            "GLOBAL" => Some(Self::Global),
            _ => None,
        }
    }
}

crate::impl_pg_string_enum!(WorkflowScope, WorkflowScope::parse);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, Validate)]
pub struct Workflow {
    pub id: Uuid,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub service_id: Uuid,
    /// `Some` only when `scope == Team` ("required iff
    /// team-scoped"). Global workflows match lifecycle events from any
    /// team.
    pub team_id: Option<Uuid>,
    pub scope: WorkflowScope,
    pub is_enabled: bool,
    /// Lifecycle event type this workflow's matcher looks for
    /// (`incident.created`, `state_changed`, `note_added`, ...).
    pub trigger_event: String,
    /// Dotted-path `{field, op, value}` conditions, all of which must
    /// hold for the matcher to fire (AND). Stored as JSON rather than a
    /// typed column since `op` is presently always `equals` but the
    /// shape mirrors the workflow definition's own condition nodes.
    pub trigger_conditions: serde_json::Value,
    pub active_version_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowNodeKind {
    Trigger,
    Action,
    Condition,
    Wait,
}

/// One node of the workflow DAG. `depends_on` lists predecessor node ids;
/// `config` holds node-kind-specific data (the action to invoke, the
/// condition expression, the wait duration) with handlebars-style
/// `{{ path }}` placeholders resolved against the triggering incident at
/// execution time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowNode {
    pub id: String,
    pub kind: WorkflowNodeKind,
    pub depends_on: Vec<String>,
    pub config: serde_json::Value,
    /// Outgoing edges keyed by a label (`"true"`/`"false"` for condition
    /// nodes, `"next"` otherwise) so the executor can pick the matching
    /// branch after evaluating a condition node.
    #[serde(default)]
    pub edges: std::collections::HashMap<String, String>,
    /// What to do when this node's final retry attempt still fails
    ///. Anything other than `"continue"` fails the
    /// whole execution.
    #[serde(default = "default_on_failure")]
    pub on_failure: String,
}

fn default_on_failure() -> String {
    "stop".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct WorkflowVersion {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub version_number: i32,
    pub nodes: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl WorkflowVersion {
    pub fn parsed_nodes(&self) -> Result<Vec<WorkflowNode>, serde_json::Error> {
        serde_json::from_value(self.nodes.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    RolledBack,
}

impl std::fmt::Display for WorkflowExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Running => write!(f, "RUNNING"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Failed => write!(f, "FAILED"),
            Self::Cancelled => write!(f, "CANCELLED"),
            Self::RolledBack => write!(f, "ROLLED_BACK"),
        }
    }
}

impl WorkflowExecutionStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "RUNNING" => Some(Self::Running),
            "COMPLETED" => Some(Self::Completed),
            "FAILED" => Some(Self::Failed),
            "CANCELLED" => Some(Self::Cancelled),
            "ROLLED_BACK" => Some(Self::RolledBack),
            _ => None,
        }
    }
}

crate::impl_pg_string_enum!(WorkflowExecutionStatus, WorkflowExecutionStatus::parse);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggeredBy {
    Event,
    Manual,
}

impl std::fmt::Display for TriggeredBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Event => write!(f, "EVENT"),
            Self::Manual => write!(f, "MANUAL"),
        }
    }
}

impl TriggeredBy {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "EVENT" => Some(Self::Event),
            "MANUAL" => Some(Self::Manual),
            _ => None,
        }
    }
}

crate::impl_pg_string_enum!(TriggeredBy, TriggeredBy::parse);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct WorkflowExecution {
    pub id: Uuid,
    pub workflow_version_id: Uuid,
    pub incident_id: Uuid,
    pub status: WorkflowExecutionStatus,
    pub triggered_by: TriggeredBy,
    pub trigger_event: String,
    /// Ids of workflow ids this run's trigger chain has already passed
    /// through, used for cycle prevention. Distinct from `completed_nodes`, which
    /// tracks progress through this run's own DAG.
    pub execution_chain: Vec<String>,
    /// `{nodeId, status, result?, error?}` entries appended after each
    /// node finishes; doubles as the rollback-order source.
    pub node_results: serde_json::Value,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workflow_nodes_round_trip_through_json() {
        let nodes = vec![WorkflowNode {
            id: "notify".into(),
            kind: WorkflowNodeKind::Action,
            depends_on: vec![],
            config: serde_json::json!({"action": "notify", "target": "{{ incident.service_id }}"}),
            edges: std::collections::HashMap::new(),
            on_failure: "stop".into(),
        }];
        let version = WorkflowVersion {
            id: Uuid::new_v4(),
            workflow_id: Uuid::new_v4(),
            version_number: 1,
            nodes: serde_json::to_value(&nodes).unwrap(),
            created_at: Utc::now(),
        };
        let parsed = version.parsed_nodes().unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].id, "notify");
    }
}

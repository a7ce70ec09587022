//! Matches lifecycle events to enabled workflows and snapshots a
//! `WorkflowExecution` for each match ("On each lifecycle event ...
//! enumerate enabled workflows whose scope is global or whose teamId
//! equals incident.teamId ... create a WorkflowExecution snapshot and
//! enqueue an executor job").

use beacon_models::lifecycle::{LifecycleEvent, LifecycleEventType};
use beacon_models::workflow::{TriggeredBy, Workflow, WorkflowExecution, WorkflowExecutionStatus};
use beacon_queue::{topics, Job, JobQueue, WorkflowExecutionJob};
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::dag;
use crate::state::AppState;

/// Cycle guard: a candidate workflow already present in the chain, or a
/// chain at this depth, is rejected rather than re-triggered
/// ("reject scheduling if the candidate id ∈ chain (cycle) or |chain| ≥
/// MAX_DEPTH=3").
pub const MAX_DEPTH: usize = 3;

fn trigger_context(incident: &beacon_models::incident::Incident, event: &LifecycleEvent) -> Value {
    let mut context = json!({"incident": dag::incident_to_json(incident)});
    if let Some(to) = &event.state_transition_to {
        context["stateTransition"] = json!({"to": to});
    }
    context
}

fn conditions_match(conditions: &Value, context: &Value) -> bool {
    let Some(list) = conditions.as_array() else {
        return true;
    };
    list.iter().all(|condition| {
        let (Some(field), Some(op)) = (condition.get("field").and_then(Value::as_str), condition.get("op").and_then(Value::as_str)) else {
            return false;
        };
        let expected = condition.get("value").unwrap_or(&Value::Null);
        match op {
            "equals" => dag::equals(context, field, expected),
            _ => false,
        }
    })
}

fn is_cycle(workflow_id: Uuid, chain: &[Uuid]) -> bool {
    chain.len() >= MAX_DEPTH || chain.contains(&workflow_id)
}

async fn matches(workflow: &Workflow, event: &LifecycleEvent, context: &Value) -> bool {
    if workflow.trigger_event != event.event_type.trigger_name() {
        return false;
    }
    conditions_match(&workflow.trigger_conditions, context)
}

/// Processes one lifecycle event: finds every enabled workflow whose
/// trigger matches, and for each, snapshots a `WorkflowExecution` against
/// the workflow's active version and enqueues an executor job.
pub async fn process_lifecycle_event(state: &AppState, event: LifecycleEvent) -> anyhow::Result<()> {
    let Some(incident) = state.incidents.get(event.incident_id).await? else {
        tracing::warn!(incident_id = %event.incident_id, "lifecycle event for unknown incident, skipping workflow match");
        return Ok(());
    };
    let Some(service) = state.services.find_by_id(incident.service_id).await? else {
        tracing::warn!(service_id = %incident.service_id, "incident references unknown service, skipping workflow match");
        return Ok(());
    };

    let candidates = state.workflows.find_enabled_for_team(service.team_id).await?;
    let context = trigger_context(&incident, &event);

    for workflow in candidates {
        if !matches(&workflow, &event, &context).await {
            continue;
        }

        let Some(version_id) = workflow.active_version_id else {
            tracing::warn!(workflow_id = %workflow.id, "matched workflow has no active version, skipping");
            continue;
        };

        if is_cycle(workflow.id, &event.execution_chain) {
            tracing::warn!(workflow_id = %workflow.id, chain_len = event.execution_chain.len(), "workflow trigger rejected: cycle or max depth reached");
            continue;
        }

        let mut chain: Vec<String> = event.execution_chain.iter().map(|id| id.to_string()).collect();
        chain.push(workflow.id.to_string());

        let execution = WorkflowExecution {
            id: Uuid::new_v4(),
            workflow_version_id: version_id,
            incident_id: incident.id,
            status: WorkflowExecutionStatus::Pending,
            triggered_by: TriggeredBy::Event,
            trigger_event: event.event_type.trigger_name().to_string(),
            execution_chain: chain,
            node_results: Value::Array(Vec::new()),
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        };

        state.executions.create(&execution).await?;

        if let Err(err) = state.execution_queue.enqueue(Job::new(topics::WORKFLOW_EXECUTION, WorkflowExecutionJob { execution_id: execution.id }, Utc::now(), 3)).await {
            tracing::warn!(error = %err, execution_id = %execution.id, "failed to enqueue workflow execution job");
        }
    }

    Ok(())
}

/// Polls the `lifecycle_events` queue and matches each event against
/// enabled workflows, mirroring the escalation engine's lifecycle
/// worker loop.
pub async fn run_matcher_worker(state: AppState, interval: std::time::Duration) {
    loop {
        match state.lifecycle_queue.pop_due(topics::LIFECYCLE_EVENTS, Utc::now()).await {
            Ok(jobs) => {
                for job in jobs {
                    if let Err(err) = process_lifecycle_event(&state, job.payload).await {
                        tracing::warn!(error = %err, "failed to process lifecycle event in workflow matcher");
                    }
                }
            }
            Err(err) => tracing::warn!(error = %err, "failed to poll lifecycle events"),
        }
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_models::incident::{Incident, IncidentStatus};
    use beacon_models::alert::Severity;
    use serde_json::json;

    fn sample_incident() -> Incident {
        Incident {
            id: Uuid::new_v4(),
            service_id: Uuid::new_v4(),
            title: "db down".into(),
            severity: Severity::High,
            status: IncidentStatus::Triggered,
            fingerprint: "fp".into(),
            alert_count: 1,
            escalation_policy_id: Uuid::new_v4(),
            current_escalation_level: 1,
            current_repeat: 1,
            acknowledged_by: None,
            acknowledged_at: None,
            resolved_by: None,
            resolved_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn cycle_guard_rejects_repeat_workflow_and_max_depth() {
        let workflow_id = Uuid::new_v4();
        assert!(!is_cycle(workflow_id, &[]));
        assert!(is_cycle(workflow_id, &[workflow_id]));
        assert!(is_cycle(Uuid::new_v4(), &[Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()]));
    }

    #[test]
    fn all_conditions_must_hold() {
        let incident = sample_incident();
        let context = json!({"incident": dag::incident_to_json(&incident)});
        let conditions = json!([
            {"field": "incident.severity", "op": "equals", "value": "HIGH"},
            {"field": "incident.alert_count", "op": "equals", "value": 1},
        ]);
        assert!(conditions_match(&conditions, &context));

        let failing = json!([{"field": "incident.severity", "op": "equals", "value": "LOW"}]);
        assert!(!conditions_match(&failing, &context));
    }

    #[test]
    fn empty_conditions_list_always_matches() {
        let context = json!({"incident": {}});
        assert!(conditions_match(&json!([]), &context));
    }

    #[test]
    fn state_transition_to_is_available_in_context_for_state_changed_events() {
        let incident = sample_incident();
        let event = LifecycleEvent::new(LifecycleEventType::StateChanged, incident.id, Utc::now()).with_state_transition("RESOLVED");
        let context = trigger_context(&incident, &event);
        let conditions = json!([{"field": "stateTransition.to", "op": "equals", "value": "RESOLVED"}]);
        assert!(conditions_match(&conditions, &context));
    }
}

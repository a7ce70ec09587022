//! Walks a `WorkflowExecution`'s immutable `definitionSnapshot` -
//! identified by `workflow_version_id`, an append-only row never
//! mutated after creation - node by node, interpolating, invoking
//! actions, and retrying per node, until the chain ends or a node fails
//! without `onFailure = continue`.

use std::collections::HashMap;
use std::time::Duration;

use beacon_cache::RateLimitConfig;
use beacon_models::incident::Incident;
use beacon_models::notification::NotificationTier;
use beacon_models::team::{Team, TeamMember};
use beacon_models::workflow::{Workflow, WorkflowExecutionStatus, WorkflowNode, WorkflowNodeKind};
use beacon_queue::{topics, Job, JobQueue, NotificationDispatchJob};
use chrono::Utc;
use serde_json::{json, Value};

use crate::actions::{self, ActionError};
use crate::dag;
use crate::scheduler::RetryPolicy;
use crate::state::AppState;

/// Nodes of kind `wait` sleep in-process; this bounds how long one
/// execution can block a worker slot. There is no durable resumable
/// timer for sub-execution waits, so a long wait is rejected rather than
/// pinning a concurrency slot indefinitely.
const MAX_WAIT_SECONDS: u64 = 300;

const EXECUTION_RATE_LIMIT_KEY: &str = "workflow:execution";

fn execution_rate_limit() -> RateLimitConfig {
    RateLimitConfig { max_requests: 100, window: Duration::from_secs(60) }
}

fn build_context(incident: &Incident, assignee: Option<&TeamMember>, team: Option<&Team>, workflow: &Workflow, secrets: &Value) -> Value {
    json!({
        "incident": dag::incident_to_json(incident),
        "assignee": assignee.map(|m| json!({"id": m.id, "name": m.name, "email": m.email})),
        "team": team.map(|t| json!({"id": t.id, "name": t.name, "tag": t.tag})),
        "workflow": {"id": workflow.id, "name": workflow.name},
        "secrets": secrets,
    })
}

/// Secrets referenced by name are meant to come from "an encrypted
/// per-workflow store" this crate does not yet have; until one exists
/// `TemplateContext.secrets` is always empty, which trivially satisfies
/// "must never appear in exports or logs".
fn load_secrets(_workflow_id: uuid::Uuid) -> Value {
    json!({})
}

fn evaluate_condition(node: &WorkflowNode, context: &Value) -> bool {
    let (Some(field), Some(value)) = (node.config.get("field").and_then(Value::as_str), node.config.get("value")) else {
        return false;
    };
    dag::equals(context, field, value)
}

async fn mark_terminal(state: &AppState, mut execution: beacon_models::workflow::WorkflowExecution, status: WorkflowExecutionStatus, error: Option<String>) -> anyhow::Result<()> {
    execution.status = status;
    execution.error = error;
    execution.finished_at = Some(Utc::now());
    state.executions.update(&execution).await?;
    Ok(())
}

/// Processes one `workflow_execution` job end to end: loads the
/// execution, transitions PENDING -> RUNNING, walks the DAG, and leaves
/// the execution COMPLETED or FAILED.
pub async fn process_execution_job(state: &AppState, job: beacon_queue::WorkflowExecutionJob) -> anyhow::Result<()> {
    let Some(mut execution) = state.executions.find_by_id(job.execution_id).await? else {
        tracing::warn!(execution_id = %job.execution_id, "executor job for unknown execution, dropping");
        return Ok(());
    };
    if execution.status != WorkflowExecutionStatus::Pending {
        return Ok(());
    }

    let (admitted, cache_err) = state.rate_limiter.check(EXECUTION_RATE_LIMIT_KEY, execution_rate_limit()).await;
    if let Some(err) = cache_err {
        tracing::warn!(error = %err, "workflow execution rate limit check degraded open");
    }
    if !admitted {
        state
            .execution_queue
            .enqueue(Job::new(topics::WORKFLOW_EXECUTION, job, Utc::now() + chrono::Duration::seconds(1), 3))
            .await
            .ok();
        return Ok(());
    }

    let Some(version) = state.versions.find_by_id(execution.workflow_version_id).await? else {
        return mark_terminal(state, execution, WorkflowExecutionStatus::Failed, Some("workflow version not found".into())).await;
    };
    let Some(workflow) = state.workflows.find_by_id(version.workflow_id).await? else {
        return mark_terminal(state, execution, WorkflowExecutionStatus::Failed, Some("workflow not found".into())).await;
    };
    let Some(incident) = state.incidents.get(execution.incident_id).await? else {
        return mark_terminal(state, execution, WorkflowExecutionStatus::Failed, Some("incident not found".into())).await;
    };

    let service = state.services.find_by_id(incident.service_id).await?;
    let team = match &service {
        Some(service) => state.teams.find_by_id(service.team_id).await?,
        None => None,
    };
    let assignee = match incident.acknowledged_by {
        Some(user_id) => state.team_members.find_by_id(user_id).await?,
        None => None,
    };
    let secrets = load_secrets(workflow.id);
    let context = build_context(&incident, assignee.as_ref(), team.as_ref(), &workflow, &secrets);

    execution.status = WorkflowExecutionStatus::Running;
    state.executions.update(&execution).await?;

    let nodes = match version.parsed_nodes() {
        Ok(nodes) => nodes,
        Err(err) => return mark_terminal(state, execution, WorkflowExecutionStatus::Failed, Some(format!("malformed definition: {err}"))).await,
    };
    let by_id: HashMap<&str, &WorkflowNode> = nodes.iter().map(|n| (n.id.as_str(), n)).collect();
    let Some(start) = nodes.iter().find(|n| n.kind == WorkflowNodeKind::Trigger) else {
        return mark_terminal(state, execution, WorkflowExecutionStatus::Failed, Some("definition has no trigger node".into())).await;
    };

    let mut node_results = Vec::new();
    let mut current_id = Some(start.id.clone());
    let mut failure: Option<String> = None;
    let mut cancelled = false;

    while let Some(id) = current_id.take() {
        match state.executions.find_by_id(execution.id).await {
            Ok(Some(latest)) if latest.status == WorkflowExecutionStatus::Cancelled => {
                cancelled = true;
                break;
            }
            _ => {}
        }

        let Some(node) = by_id.get(id.as_str()) else {
            failure = Some(format!("dangling edge to unknown node '{id}'"));
            break;
        };

        match node.kind {
            WorkflowNodeKind::Trigger => {
                node_results.push(json!({"nodeId": node.id, "status": "COMPLETED"}));
                current_id = node.edges.get("next").cloned();
            }
            WorkflowNodeKind::Condition => {
                let outcome = evaluate_condition(node, &context);
                node_results.push(json!({"nodeId": node.id, "status": "COMPLETED", "result": outcome}));
                let branch = if outcome { "true" } else { "false" };
                current_id = node.edges.get(branch).cloned();
            }
            WorkflowNodeKind::Wait => {
                let seconds = node.config.get("durationSeconds").and_then(Value::as_u64).unwrap_or(0).min(MAX_WAIT_SECONDS);
                tokio::time::sleep(Duration::from_secs(seconds)).await;
                node_results.push(json!({"nodeId": node.id, "status": "COMPLETED"}));
                current_id = node.edges.get("next").cloned();
            }
            WorkflowNodeKind::Action => {
                let rendered = match beacon_utils::render_json(&node.config, &context) {
                    Ok(value) => value,
                    Err(err) => {
                        node_results.push(json!({"nodeId": node.id, "status": "FAILED", "error": err.to_string()}));
                        if node.on_failure == "continue" {
                            current_id = node.edges.get("next").cloned();
                            continue;
                        } else {
                            failure = Some(format!("{}: {}", node.id, err));
                            break;
                        }
                    }
                };

                let policy = RetryPolicy::from_node_config(&node.config);
                let mut outcome = None;
                let mut last_error = String::new();
                for attempt in 0..policy.attempts {
                    if attempt > 0 {
                        tokio::time::sleep(policy.delay_for_attempt(attempt)).await;
                    }
                    match actions::invoke(&state.http, &rendered).await {
                        Ok(result) => {
                            outcome = Some(result);
                            break;
                        }
                        Err(err) => last_error = action_error_message(&err),
                    }
                }

                match outcome {
                    Some(result) => {
                        node_results.push(json!({"nodeId": node.id, "status": "COMPLETED", "result": result}));
                        current_id = node.edges.get("next").cloned();
                    }
                    None => {
                        node_results.push(json!({"nodeId": node.id, "status": "FAILED", "error": last_error}));
                        if node.on_failure == "continue" {
                            current_id = node.edges.get("next").cloned();
                        } else {
                            failure = Some(format!("{}: {}", node.id, last_error));
                            break;
                        }
                    }
                }
            }
        }
    }

    execution.node_results = Value::Array(node_results);

    if cancelled {
        return Ok(());
    }

    if let Some(message) = failure {
        mark_terminal(state, execution, WorkflowExecutionStatus::Failed, Some(message)).await?;
        dispatch_failure_notifications(state, &incident, &workflow).await;
        return Ok(());
    }

    mark_terminal(state, execution, WorkflowExecutionStatus::Completed, None).await
}

fn action_error_message(err: &ActionError) -> String {
    err.to_string()
}

/// Failure notifications to (a) the incident's assignee, (b) the
/// workflow's creator, (c) the team channel. Only (a) is wired: the
/// `Workflow` model carries no creator field and `Team` carries no
/// channel URL, so (b)/(c) degrade to a logged warning rather than a
/// fabricated destination. None of these failing re-fails the execution.
async fn dispatch_failure_notifications(state: &AppState, incident: &Incident, workflow: &Workflow) {
    match incident.acknowledged_by {
        Some(assignee_id) => {
            let job = NotificationDispatchJob {
                incident_id: incident.id,
                user_id: assignee_id,
                escalation_level: incident.current_escalation_level,
                tier: NotificationTier::Primary,
            };
            if let Err(err) = state.notification_queue.enqueue(Job::new(topics::NOTIFICATION_DISPATCH, job, Utc::now(), 3)).await {
                tracing::warn!(error = %err, incident_id = %incident.id, "failed to enqueue workflow failure notification to assignee");
            }
        }
        None => tracing::warn!(incident_id = %incident.id, "workflow execution failed but incident has no assignee to notify"),
    }
    tracing::warn!(workflow_id = %workflow.id, "workflow failure notification to workflow creator skipped: no creator is tracked on this workflow");
    tracing::warn!(workflow_id = %workflow.id, "workflow failure notification to team channel skipped: no channel is configured on this team");
}

/// Polls `workflow_execution` jobs and runs each under the shared
/// concurrency semaphore ("Concurrency ≤ 5 executions in parallel").
pub async fn run_executor_worker(state: AppState, interval: Duration) {
    loop {
        match state.execution_queue.pop_due(topics::WORKFLOW_EXECUTION, Utc::now()).await {
            Ok(jobs) => {
                for job in jobs {
                    let state = state.clone();
                    let permit = state.concurrency.clone().acquire_owned().await.expect("workflow concurrency semaphore never closes");
                    tokio::spawn(async move {
                        let _permit = permit;
                        if let Err(err) = process_execution_job(&state, job.payload).await {
                            tracing::warn!(error = %err, "workflow execution job failed");
                        }
                    });
                }
            }
            Err(err) => tracing::warn!(error = %err, "failed to poll workflow execution queue"),
        }
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condition_node_without_field_or_value_does_not_match() {
        let node = WorkflowNode {
            id: "cond".into(),
            kind: WorkflowNodeKind::Condition,
            depends_on: vec![],
            config: json!({}),
            edges: HashMap::new(),
            on_failure: "stop".into(),
        };
        let context = json!({"incident": {"severity": "HIGH"}});
        assert!(!evaluate_condition(&node, &context));
    }

    #[test]
    fn condition_node_evaluates_field_against_context() {
        let node = WorkflowNode {
            id: "cond".into(),
            kind: WorkflowNodeKind::Condition,
            depends_on: vec![],
            config: json!({"field": "incident.severity", "value": "HIGH"}),
            edges: HashMap::new(),
            on_failure: "stop".into(),
        };
        let context = json!({"incident": {"severity": "HIGH"}});
        assert!(evaluate_condition(&node, &context));
    }
}

//! Beacon Workflow Service: matches lifecycle events to enabled
//! workflows, executes their DAG, and exposes the two workflow
//! operations this pipeline owns directly — manual execution and
//! rollback ("broader workflow CRUD is not [implemented] (non-goal)").

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::{serve, Router as AxumRouter};
use beacon_cache::{CacheConfig, RedisCache, SlidingWindowRateLimiter};
use beacon_models::workflow::{TriggeredBy, WorkflowExecution, WorkflowExecutionStatus, WorkflowVersion};
use beacon_queue::{topics, Job, JobQueue, RedisJobQueue, WorkflowExecutionJob};
use beacon_store::{
    create_postgres_pool, EscalationPolicyRepository, PostgresIncidentStore, ServiceRepository,
    TeamMemberRepository, TeamRepository, WorkflowExecutionRepository, WorkflowRepository, WorkflowVersionRepository,
};
use beacon_utils::{init_logging, AppConfig};
use beacon_workflow::executor::run_executor_worker;
use beacon_workflow::matcher::run_matcher_worker;
use beacon_workflow::state::AppState;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Semaphore;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

/// "Concurrency ≤ 5 executions in parallel."
const MAX_CONCURRENT_EXECUTIONS: usize = 5;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load().unwrap_or_else(|_| {
        eprintln!("failed to load configuration, using defaults");
        AppConfig::default()
    });
    init_logging(&config.logging)?;
    info!("starting beacon workflow service");

    let pool = create_postgres_pool(&config.database.postgres_url, config.database.max_connections).await?;
    beacon_store::migrations::run_postgres_migrations(&pool).await?;

    let cache: beacon_cache::SharedCache = Arc::new(RedisCache::new(CacheConfig {
        redis_url: config.database.redis_url.clone(),
        ..Default::default()
    })?);

    let state = AppState {
        workflows: Arc::new(WorkflowRepository::new(pool.clone())),
        versions: Arc::new(WorkflowVersionRepository::new(pool.clone())),
        executions: Arc::new(WorkflowExecutionRepository::new(pool.clone())),
        incidents: Arc::new(PostgresIncidentStore::new(pool.clone())),
        services: Arc::new(ServiceRepository::new(pool.clone())),
        escalation_policies: Arc::new(EscalationPolicyRepository::new(pool.clone())),
        teams: Arc::new(TeamRepository::new(pool.clone())),
        team_members: Arc::new(TeamMemberRepository::new(pool.clone())),
        lifecycle_queue: Arc::new(RedisJobQueue::new(&config.database.redis_url, "beacon:")?),
        execution_queue: Arc::new(RedisJobQueue::new(&config.database.redis_url, "beacon:")?),
        notification_queue: Arc::new(RedisJobQueue::new(&config.database.redis_url, "beacon:")?),
        rate_limiter: Arc::new(SlidingWindowRateLimiter::new(cache)),
        concurrency: Arc::new(Semaphore::new(MAX_CONCURRENT_EXECUTIONS)),
        http: reqwest::Client::new(),
    };

    let app = AxumRouter::new()
        .route("/health", get(health))
        .route("/api/workflows/:id/execute", post(execute_workflow))
        .route("/api/workflows/:id/rollback", post(rollback_workflow))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "workflow service listening");

    let matcher_state = state.clone();
    let executor_state = state.clone();
    tokio::select! {
        result = serve(listener, app) => result.map_err(Into::into),
        _ = run_matcher_worker(matcher_state, Duration::from_millis(500)) => Ok(()),
        _ = run_executor_worker(executor_state, Duration::from_millis(500)) => Ok(()),
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "healthy", "service": "beacon-workflow", "timestamp": Utc::now().to_rfc3339()}))
}

#[derive(Debug, Deserialize)]
struct ExecuteRequest {
    #[serde(rename = "incidentId")]
    incident_id: Uuid,
}

/// `POST /api/workflows/{id}/execute` — manually triggers one workflow
/// against a named incident, bypassing trigger-condition matching
/// ("authenticated; body {incidentId}. Response 202 with {executionId,
/// status:"PENDING"}"). Enters the same cycle-guarded execution chain
/// as an event-triggered run, starting from an empty chain.
async fn execute_workflow(State(state): State<AppState>, Path(workflow_id): Path<Uuid>, Json(request): Json<ExecuteRequest>) -> axum::response::Response {
    let workflow = match state.workflows.find_by_id(workflow_id).await {
        Ok(Some(workflow)) => workflow,
        Ok(None) => return (StatusCode::NOT_FOUND, Json(json!({"error": "workflow not found"}))).into_response(),
        Err(err) => return internal_error(err),
    };
    let Some(version_id) = workflow.active_version_id else {
        return (StatusCode::CONFLICT, Json(json!({"error": "workflow has no active version"}))).into_response();
    };
    match state.incidents.get(request.incident_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return (StatusCode::NOT_FOUND, Json(json!({"error": "incident not found"}))).into_response(),
        Err(err) => return internal_error(err),
    }

    let execution = WorkflowExecution {
        id: Uuid::new_v4(),
        workflow_version_id: version_id,
        incident_id: request.incident_id,
        status: WorkflowExecutionStatus::Pending,
        triggered_by: TriggeredBy::Manual,
        trigger_event: "manual".to_string(),
        execution_chain: vec![workflow_id.to_string()],
        node_results: serde_json::Value::Array(Vec::new()),
        error: None,
        started_at: Utc::now(),
        finished_at: None,
    };

    if let Err(err) = state.executions.create(&execution).await {
        return internal_error(err);
    }
    if let Err(err) = state
        .execution_queue
        .enqueue(Job::new(topics::WORKFLOW_EXECUTION, WorkflowExecutionJob { execution_id: execution.id }, Utc::now(), 3))
        .await
    {
        tracing::warn!(error = %err, execution_id = %execution.id, "failed to enqueue manually triggered workflow execution");
    }

    (StatusCode::ACCEPTED, Json(json!({"executionId": execution.id, "status": "PENDING"}))).into_response()
}

#[derive(Debug, Deserialize)]
struct RollbackRequest {
    #[serde(rename = "toVersion")]
    to_version: i32,
}

/// `POST /api/workflows/{id}/rollback` — "creates version N+1 equal to
/// `toVersion`'s definition", never mutating the version being rolled
/// back to ("append-only, never mutates older versions").
async fn rollback_workflow(State(state): State<AppState>, Path(workflow_id): Path<Uuid>, Json(request): Json<RollbackRequest>) -> axum::response::Response {
    match state.workflows.find_by_id(workflow_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return (StatusCode::NOT_FOUND, Json(json!({"error": "workflow not found"}))).into_response(),
        Err(err) => return internal_error(err),
    }

    let target = match state.versions.find_by_version_number(workflow_id, request.to_version).await {
        Ok(Some(version)) => version,
        Ok(None) => return (StatusCode::NOT_FOUND, Json(json!({"error": "target version not found"}))).into_response(),
        Err(err) => return internal_error(err),
    };

    let next_number = match state.versions.next_version_number(workflow_id).await {
        Ok(n) => n,
        Err(err) => return internal_error(err),
    };

    let new_version = WorkflowVersion { id: Uuid::new_v4(), workflow_id, version_number: next_number, nodes: target.nodes.clone(), created_at: Utc::now() };

    if let Err(err) = state.versions.create(&new_version).await {
        return internal_error(err);
    }
    if let Err(err) = state.workflows.set_active_version(workflow_id, new_version.id).await {
        return internal_error(err);
    }

    (
        StatusCode::CREATED,
        Json(json!({"workflowId": workflow_id, "version": new_version.version_number, "rolledBackTo": request.to_version})),
    )
        .into_response()
}

fn internal_error(err: anyhow::Error) -> axum::response::Response {
    tracing::warn!(error = %err, "workflow service request failed");
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": "internal"}))).into_response()
}

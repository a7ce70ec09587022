//! Workflow engine storage: definitions, versions, and per-incident
//! execution state.

use anyhow::{Context, Result};
use beacon_models::workflow::{Workflow, WorkflowExecution, WorkflowVersion};
use sqlx::PgPool;
use uuid::Uuid;

pub struct WorkflowRepository {
    pool: PgPool,
}

impl WorkflowRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Workflow>> {
        let row: Option<Workflow> = sqlx::query_as("SELECT * FROM workflows WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("find workflow by id")?;
        Ok(row)
    }

    pub async fn find_for_service(&self, service_id: Uuid) -> Result<Vec<Workflow>> {
        let rows: Vec<Workflow> = sqlx::query_as("SELECT * FROM workflows WHERE service_id = $1")
            .bind(service_id)
            .fetch_all(&self.pool)
            .await
            .context("find workflows for service")?;
        Ok(rows)
    }

    /// Candidate workflows for the matcher: enabled, and
    /// either global or scoped to `team_id`.
    pub async fn find_enabled_for_team(&self, team_id: Uuid) -> Result<Vec<Workflow>> {
        let rows: Vec<Workflow> = sqlx::query_as(
            "SELECT * FROM workflows WHERE is_enabled = TRUE AND (scope = 'GLOBAL' OR team_id = $1)",
        )
        .bind(team_id)
        .fetch_all(&self.pool)
        .await
        .context("find enabled workflows for team")?;
        Ok(rows)
    }

    pub async fn create(&self, workflow: &Workflow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO workflows
                (id, name, service_id, team_id, scope, is_enabled, trigger_event, trigger_conditions, active_version_id, created_at)
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)
            "#,
        )
        .bind(workflow.id)
        .bind(&workflow.name)
        .bind(workflow.service_id)
        .bind(workflow.team_id)
        .bind(workflow.scope.to_string())
        .bind(workflow.is_enabled)
        .bind(&workflow.trigger_event)
        .bind(&workflow.trigger_conditions)
        .bind(workflow.active_version_id)
        .bind(workflow.created_at)
        .execute(&self.pool)
        .await
        .context("insert workflow")?;
        Ok(())
    }

    pub async fn set_active_version(&self, workflow_id: Uuid, version_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE workflows SET active_version_id = $2 WHERE id = $1")
            .bind(workflow_id)
            .bind(version_id)
            .execute(&self.pool)
            .await
            .context("set active workflow version")?;
        Ok(())
    }
}

pub struct WorkflowVersionRepository {
    pool: PgPool,
}

impl WorkflowVersionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<WorkflowVersion>> {
        let row: Option<WorkflowVersion> = sqlx::query_as("SELECT * FROM workflow_versions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("find workflow version by id")?;
        Ok(row)
    }

    pub async fn create(&self, version: &WorkflowVersion) -> Result<()> {
        sqlx::query(
            "INSERT INTO workflow_versions (id, workflow_id, version_number, nodes, created_at) VALUES ($1,$2,$3,$4,$5)",
        )
        .bind(version.id)
        .bind(version.workflow_id)
        .bind(version.version_number)
        .bind(&version.nodes)
        .bind(version.created_at)
        .execute(&self.pool)
        .await
        .context("insert workflow version")?;
        Ok(())
    }

    pub async fn find_for_workflow(&self, workflow_id: Uuid) -> Result<Vec<WorkflowVersion>> {
        let rows: Vec<WorkflowVersion> = sqlx::query_as(
            "SELECT * FROM workflow_versions WHERE workflow_id = $1 ORDER BY version_number ASC",
        )
        .bind(workflow_id)
        .fetch_all(&self.pool)
        .await
        .context("find workflow versions for workflow")?;
        Ok(rows)
    }

    pub async fn find_by_version_number(&self, workflow_id: Uuid, version_number: i32) -> Result<Option<WorkflowVersion>> {
        let row: Option<WorkflowVersion> = sqlx::query_as(
            "SELECT * FROM workflow_versions WHERE workflow_id = $1 AND version_number = $2",
        )
        .bind(workflow_id)
        .bind(version_number)
        .fetch_optional(&self.pool)
        .await
        .context("find workflow version by number")?;
        Ok(row)
    }

    /// `1 + ` the highest existing version number for `workflow_id`, or
    /// `1` if the workflow has no versions yet ("version monotone per
    /// workflow" — append-only, never reusing a number).
    pub async fn next_version_number(&self, workflow_id: Uuid) -> Result<i32> {
        let row: (Option<i32>,) = sqlx::query_as(
            "SELECT MAX(version_number) FROM workflow_versions WHERE workflow_id = $1",
        )
        .bind(workflow_id)
        .fetch_one(&self.pool)
        .await
        .context("compute next workflow version number")?;
        Ok(row.0.unwrap_or(0) + 1)
    }
}

pub struct WorkflowExecutionRepository {
    pool: PgPool,
}

impl WorkflowExecutionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<WorkflowExecution>> {
        let row: Option<WorkflowExecution> = sqlx::query_as("SELECT * FROM workflow_executions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("find workflow execution by id")?;
        Ok(row)
    }

    pub async fn create(&self, execution: &WorkflowExecution) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO workflow_executions
                (id, workflow_version_id, incident_id, status, triggered_by, trigger_event,
                 execution_chain, node_results, error, started_at, finished_at)
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11)
            "#,
        )
        .bind(execution.id)
        .bind(execution.workflow_version_id)
        .bind(execution.incident_id)
        .bind(execution.status.to_string())
        .bind(execution.triggered_by.to_string())
        .bind(&execution.trigger_event)
        .bind(&execution.execution_chain)
        .bind(&execution.node_results)
        .bind(&execution.error)
        .bind(execution.started_at)
        .bind(execution.finished_at)
        .execute(&self.pool)
        .await
        .context("insert workflow execution")?;
        Ok(())
    }

    pub async fn update(&self, execution: &WorkflowExecution) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE workflow_executions SET
                status = $2, execution_chain = $3, node_results = $4, error = $5, finished_at = $6
            WHERE id = $1
            "#,
        )
        .bind(execution.id)
        .bind(execution.status.to_string())
        .bind(&execution.execution_chain)
        .bind(&execution.node_results)
        .bind(&execution.error)
        .bind(execution.finished_at)
        .execute(&self.pool)
        .await
        .context("update workflow execution")?;
        Ok(())
    }

    /// Executions currently in flight for an incident, used by the
    /// matcher's cycle guard to read the in-progress `execution_chain`
    /// before enqueuing a downstream workflow.
    pub async fn find_running_for_incident(&self, incident_id: Uuid) -> Result<Vec<WorkflowExecution>> {
        let rows: Vec<WorkflowExecution> = sqlx::query_as(
            "SELECT * FROM workflow_executions WHERE incident_id = $1 AND status IN ('PENDING', 'RUNNING')",
        )
        .bind(incident_id)
        .fetch_all(&self.pool)
        .await
        .context("find running workflow executions for incident")?;
        Ok(rows)
    }
}

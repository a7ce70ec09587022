//! Escalation policy storage.

use anyhow::{Context, Result};
use beacon_models::escalation_policy::{EscalationLevel, EscalationPolicy};
use sqlx::PgPool;
use uuid::Uuid;

pub struct EscalationPolicyRepository {
    pool: PgPool,
}

impl EscalationPolicyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<EscalationPolicy>> {
        let row: Option<EscalationPolicy> = sqlx::query_as("SELECT * FROM escalation_policies WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("find escalation policy by id")?;
        Ok(row)
    }

    pub async fn create(&self, policy: &EscalationPolicy) -> Result<()> {
        sqlx::query("INSERT INTO escalation_policies (id, name, team_id, repeat_limit, is_active) VALUES ($1,$2,$3,$4,$5)")
            .bind(policy.id)
            .bind(&policy.name)
            .bind(policy.team_id)
            .bind(policy.repeat_limit)
            .bind(policy.is_active)
            .execute(&self.pool)
            .await
            .context("insert escalation policy")?;
        Ok(())
    }
}

pub struct EscalationLevelRepository {
    pool: PgPool,
}

impl EscalationLevelRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_for_policy(&self, policy_id: Uuid) -> Result<Vec<EscalationLevel>> {
        let rows: Vec<EscalationLevel> = sqlx::query_as(
            "SELECT * FROM escalation_levels WHERE escalation_policy_id = $1 ORDER BY level_index ASC",
        )
        .bind(policy_id)
        .fetch_all(&self.pool)
        .await
        .context("find escalation levels for policy")?;
        Ok(rows)
    }

    pub async fn create(&self, level: &EscalationLevel) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO escalation_levels (id, escalation_policy_id, level_index, targets, timeout_minutes)
            VALUES ($1,$2,$3,$4,$5)
            "#,
        )
        .bind(level.id)
        .bind(level.escalation_policy_id)
        .bind(level.level_index)
        .bind(&level.targets)
        .bind(level.timeout_minutes)
        .execute(&self.pool)
        .await
        .context("insert escalation level")?;
        Ok(())
    }
}

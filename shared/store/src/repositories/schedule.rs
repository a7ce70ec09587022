//! On-call schedule storage.

use anyhow::{Context, Result};
use beacon_models::schedule::{Schedule, ScheduleLayer, ScheduleOverride};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

pub struct ScheduleRepository {
    pool: PgPool,
}

impl ScheduleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Schedule>> {
        let row: Option<Schedule> = sqlx::query_as("SELECT * FROM schedules WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("find schedule by id")?;
        Ok(row)
    }

    pub async fn create(&self, schedule: &Schedule) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO schedules (id, name, team_id, timezone, rotation_cron, rotation_start, rotation_user_ids, is_active)
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8)
            "#,
        )
        .bind(schedule.id)
        .bind(&schedule.name)
        .bind(schedule.team_id)
        .bind(&schedule.timezone)
        .bind(&schedule.rotation_cron)
        .bind(schedule.rotation_start)
        .bind(&schedule.rotation_user_ids)
        .bind(schedule.is_active)
        .execute(&self.pool)
        .await
        .context("insert schedule")?;
        Ok(())
    }
}

pub struct ScheduleLayerRepository {
    pool: PgPool,
}

impl ScheduleLayerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_for_schedule(&self, schedule_id: Uuid) -> Result<Vec<ScheduleLayer>> {
        let rows: Vec<ScheduleLayer> =
            sqlx::query_as("SELECT * FROM schedule_layers WHERE schedule_id = $1 ORDER BY layer_index ASC")
                .bind(schedule_id)
                .fetch_all(&self.pool)
                .await
                .context("find schedule layers")?;
        Ok(rows)
    }

    pub async fn create(&self, layer: &ScheduleLayer) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO schedule_layers
                (id, schedule_id, layer_index, rotation_cron, rotation_start, participants, restriction_start_minute, restriction_end_minute)
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8)
            "#,
        )
        .bind(layer.id)
        .bind(layer.schedule_id)
        .bind(layer.layer_index)
        .bind(&layer.rotation_cron)
        .bind(layer.rotation_start)
        .bind(&layer.participants)
        .bind(layer.restriction_start_minute)
        .bind(layer.restriction_end_minute)
        .execute(&self.pool)
        .await
        .context("insert schedule layer")?;
        Ok(())
    }
}

pub struct ScheduleOverrideRepository {
    pool: PgPool,
}

impl ScheduleOverrideRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_covering(&self, schedule_id: Uuid, at: DateTime<Utc>) -> Result<Vec<ScheduleOverride>> {
        let rows: Vec<ScheduleOverride> = sqlx::query_as(
            r#"SELECT * FROM schedule_overrides WHERE schedule_id = $1 AND "start" <= $2 AND "end" > $2"#,
        )
        .bind(schedule_id)
        .bind(at)
        .fetch_all(&self.pool)
        .await
        .context("find covering schedule overrides")?;
        Ok(rows)
    }

    pub async fn create(&self, over: &ScheduleOverride) -> Result<()> {
        sqlx::query(r#"INSERT INTO schedule_overrides (id, schedule_id, user_id, "start", "end") VALUES ($1,$2,$3,$4,$5)"#)
            .bind(over.id)
            .bind(over.schedule_id)
            .bind(over.user_id)
            .bind(over.start)
            .bind(over.end)
            .execute(&self.pool)
            .await
            .context("insert schedule override")?;
        Ok(())
    }
}

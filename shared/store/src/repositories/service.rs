//! Service and integration storage.

use anyhow::{Context, Result};
use beacon_models::service::{Integration, Service};
use sqlx::PgPool;
use uuid::Uuid;

pub struct ServiceRepository {
    pool: PgPool,
}

impl ServiceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Service>> {
        let row: Option<Service> = sqlx::query_as("SELECT * FROM services WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("find service by id")?;
        Ok(row)
    }

    pub async fn create(&self, service: &Service) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO services (id, name, description, routing_key, team_id, escalation_policy_id, status, created_at, updated_at)
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)
            "#,
        )
        .bind(service.id)
        .bind(&service.name)
        .bind(&service.description)
        .bind(&service.routing_key)
        .bind(service.team_id)
        .bind(service.escalation_policy_id)
        .bind(service.status.to_string())
        .bind(service.created_at)
        .bind(service.updated_at)
        .execute(&self.pool)
        .await
        .context("insert service")?;
        Ok(())
    }

    pub async fn find_by_routing_key(&self, routing_key: &str) -> Result<Option<Service>> {
        let row: Option<Service> = sqlx::query_as("SELECT * FROM services WHERE routing_key = $1")
            .bind(routing_key)
            .fetch_optional(&self.pool)
            .await
            .context("find service by routing key")?;
        Ok(row)
    }
}

pub struct IntegrationRepository {
    pool: PgPool,
}

impl IntegrationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Integration>> {
        let row: Option<Integration> = sqlx::query_as("SELECT * FROM integrations WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("find integration by id")?;
        Ok(row)
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Option<Integration>> {
        let row: Option<Integration> = sqlx::query_as("SELECT * FROM integrations WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .context("find integration by name")?;
        Ok(row)
    }

    pub async fn create(&self, integration: &Integration) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO integrations (
                id, service_id, name, provider, webhook_secret,
                signature_header, signature_algorithm, signature_format,
                dedup_window_minutes, is_active, created_at
            )
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11)
            "#,
        )
        .bind(integration.id)
        .bind(integration.service_id)
        .bind(&integration.name)
        .bind(&integration.provider)
        .bind(&integration.webhook_secret)
        .bind(&integration.signature_header)
        .bind(integration.signature_algorithm.to_string())
        .bind(integration.signature_format.to_string())
        .bind(integration.dedup_window_minutes)
        .bind(integration.is_active)
        .bind(integration.created_at)
        .execute(&self.pool)
        .await
        .context("insert integration")?;
        Ok(())
    }

    /// Idempotency-key/external-id dedup window lookback: has this integration used `idempotency_key` in the last 24h?
    pub async fn find_recent_delivery_by_idempotency_key(
        &self,
        integration_id: Uuid,
        idempotency_key: &str,
    ) -> Result<Option<Uuid>> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT alert_id FROM idempotency_keys
            WHERE integration_id = $1 AND idempotency_key = $2 AND created_at >= NOW() - INTERVAL '24 hours'
            "#,
        )
        .bind(integration_id)
        .bind(idempotency_key)
        .fetch_optional(&self.pool)
        .await
        .context("find idempotency key")?;
        Ok(row.map(|(alert_id,)| alert_id))
    }

    pub async fn record_idempotency_key(&self, integration_id: Uuid, idempotency_key: &str, alert_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO idempotency_keys (integration_id, idempotency_key, alert_id, created_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (integration_id, idempotency_key) DO NOTHING
            "#,
        )
        .bind(integration_id)
        .bind(idempotency_key)
        .bind(alert_id)
        .execute(&self.pool)
        .await
        .context("record idempotency key")?;
        Ok(())
    }
}

//! Alert and webhook-delivery storage.

use anyhow::{Context, Result};
use beacon_models::alert::{Alert, WebhookDelivery};
use sqlx::PgPool;
use uuid::Uuid;

pub struct AlertRepository {
    pool: PgPool,
}

impl AlertRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, alert: &Alert) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO alerts (id, integration_id, title, severity, status, fingerprint, metadata, external_id, received_at, incident_id)
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)
            "#,
        )
        .bind(alert.id)
        .bind(alert.integration_id)
        .bind(&alert.title)
        .bind(alert.severity.as_str())
        .bind(alert.status.to_string())
        .bind(&alert.fingerprint)
        .bind(&alert.metadata)
        .bind(&alert.external_id)
        .bind(alert.received_at)
        .bind(alert.incident_id)
        .execute(&self.pool)
        .await
        .context("insert alert")?;
        Ok(())
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Alert>> {
        let row: Option<Alert> = sqlx::query_as("SELECT * FROM alerts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("find alert by id")?;
        Ok(row)
    }

    /// Idempotency fallback for deliveries without an `Idempotency-Key`
    /// header ("externalId collides with an existing
    /// alert").
    pub async fn find_by_integration_and_external_id(&self, integration_id: Uuid, external_id: &str) -> Result<Option<Alert>> {
        let row: Option<Alert> = sqlx::query_as("SELECT * FROM alerts WHERE integration_id = $1 AND external_id = $2")
            .bind(integration_id)
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await
            .context("find alert by integration and external id")?;
        Ok(row)
    }

    pub async fn link_incident(&self, alert_id: Uuid, incident_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE alerts SET incident_id = $2 WHERE id = $1")
            .bind(alert_id)
            .bind(incident_id)
            .execute(&self.pool)
            .await
            .context("link alert to incident")?;
        Ok(())
    }

    pub async fn find_by_incident(&self, incident_id: Uuid) -> Result<Vec<Alert>> {
        let rows: Vec<Alert> = sqlx::query_as("SELECT * FROM alerts WHERE incident_id = $1 ORDER BY received_at ASC")
            .bind(incident_id)
            .fetch_all(&self.pool)
            .await
            .context("find alerts by incident")?;
        Ok(rows)
    }
}

pub struct WebhookDeliveryRepository {
    pool: PgPool,
}

impl WebhookDeliveryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn record(&self, delivery: &WebhookDelivery) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO webhook_deliveries (id, integration_id, integration_name, status_code, latency_ms, bytes, outcome, received_at)
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8)
            "#,
        )
        .bind(delivery.id)
        .bind(delivery.integration_id)
        .bind(&delivery.integration_name)
        .bind(delivery.status_code)
        .bind(delivery.latency_ms)
        .bind(delivery.bytes)
        .bind(&delivery.outcome)
        .bind(delivery.received_at)
        .execute(&self.pool)
        .await
        .context("record webhook delivery")?;
        Ok(())
    }
}

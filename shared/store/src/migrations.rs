//! Idempotent schema setup.
//!
//! Tables are created with `IF NOT EXISTS` rather than a numbered
//! migration runner, so startup is idempotent across restarts.
//! Enum-like columns (status, severity, channel, provider...) are stored
//! as `VARCHAR` with serde doing the tag round-trip, not native Postgres
//! enums, so adding a variant never requires an `ALTER TYPE`.

use anyhow::Result;
use sqlx::PgPool;

pub async fn run_postgres_migrations(pool: &PgPool) -> Result<()> {
    tracing::info!("running postgres migrations");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS teams (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            name VARCHAR NOT NULL,
            tag VARCHAR,
            default_escalation_policy_id UUID,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS team_members (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            team_id UUID NOT NULL REFERENCES teams(id),
            name VARCHAR NOT NULL,
            email VARCHAR NOT NULL,
            phone VARCHAR,
            contact_methods JSONB NOT NULL DEFAULT '[]',
            timezone VARCHAR NOT NULL DEFAULT 'UTC',
            role VARCHAR NOT NULL DEFAULT 'RESPONDER',
            is_active BOOLEAN NOT NULL DEFAULT TRUE,
            joined_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS escalation_policies (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            name VARCHAR NOT NULL,
            team_id UUID NOT NULL REFERENCES teams(id),
            repeat_limit INTEGER NOT NULL DEFAULT 1,
            is_active BOOLEAN NOT NULL DEFAULT TRUE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS escalation_levels (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            escalation_policy_id UUID NOT NULL REFERENCES escalation_policies(id),
            level_index INTEGER NOT NULL,
            targets JSONB NOT NULL DEFAULT '[]',
            timeout_minutes INTEGER NOT NULL,
            UNIQUE (escalation_policy_id, level_index)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schedules (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            name VARCHAR NOT NULL,
            team_id UUID NOT NULL REFERENCES teams(id),
            timezone VARCHAR NOT NULL DEFAULT 'UTC',
            rotation_cron VARCHAR NOT NULL DEFAULT '0 0 0 * * MON',
            rotation_start TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            rotation_user_ids UUID[] NOT NULL DEFAULT '{}',
            is_active BOOLEAN NOT NULL DEFAULT TRUE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schedule_layers (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            schedule_id UUID NOT NULL REFERENCES schedules(id),
            layer_index INTEGER NOT NULL,
            rotation_cron VARCHAR NOT NULL,
            rotation_start TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            participants UUID[] NOT NULL DEFAULT '{}',
            restriction_start_minute INTEGER,
            restriction_end_minute INTEGER,
            UNIQUE (schedule_id, layer_index)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schedule_overrides (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            schedule_id UUID NOT NULL REFERENCES schedules(id),
            user_id UUID NOT NULL REFERENCES team_members(id),
            "start" TIMESTAMPTZ NOT NULL,
            "end" TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS services (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            name VARCHAR NOT NULL,
            description TEXT,
            routing_key VARCHAR NOT NULL UNIQUE,
            team_id UUID NOT NULL REFERENCES teams(id),
            escalation_policy_id UUID REFERENCES escalation_policies(id),
            status VARCHAR NOT NULL DEFAULT 'ACTIVE',
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS integrations (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            service_id UUID NOT NULL REFERENCES services(id),
            name VARCHAR NOT NULL,
            provider VARCHAR NOT NULL,
            webhook_secret VARCHAR NOT NULL,
            signature_header VARCHAR NOT NULL DEFAULT 'X-Signature',
            signature_algorithm VARCHAR NOT NULL DEFAULT 'SHA256',
            signature_format VARCHAR NOT NULL DEFAULT 'HEX',
            dedup_window_minutes INTEGER NOT NULL DEFAULT 15,
            is_active BOOLEAN NOT NULL DEFAULT TRUE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS alerts (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            integration_id UUID NOT NULL REFERENCES integrations(id),
            title VARCHAR NOT NULL,
            severity VARCHAR NOT NULL,
            status VARCHAR NOT NULL,
            fingerprint VARCHAR NOT NULL,
            metadata JSONB NOT NULL DEFAULT '{}',
            external_id VARCHAR,
            received_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            incident_id UUID
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_alerts_integration_external_id
        ON alerts (integration_id, external_id)
        WHERE external_id IS NOT NULL
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS idempotency_keys (
            integration_id UUID NOT NULL REFERENCES integrations(id),
            idempotency_key VARCHAR NOT NULL,
            alert_id UUID NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            PRIMARY KEY (integration_id, idempotency_key)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS incidents (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            service_id UUID NOT NULL REFERENCES services(id),
            title VARCHAR NOT NULL,
            severity VARCHAR NOT NULL,
            status VARCHAR NOT NULL,
            fingerprint VARCHAR NOT NULL,
            alert_count INTEGER NOT NULL DEFAULT 1,
            escalation_policy_id UUID NOT NULL REFERENCES escalation_policies(id),
            current_escalation_level INTEGER NOT NULL DEFAULT 1,
            current_repeat INTEGER NOT NULL DEFAULT 1,
            acknowledged_by UUID,
            acknowledged_at TIMESTAMPTZ,
            resolved_by UUID,
            resolved_at TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS workflows (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            name VARCHAR NOT NULL,
            service_id UUID NOT NULL REFERENCES services(id),
            team_id UUID REFERENCES teams(id),
            scope VARCHAR NOT NULL DEFAULT 'TEAM',
            is_enabled BOOLEAN NOT NULL DEFAULT TRUE,
            trigger_event VARCHAR NOT NULL DEFAULT 'incident.created',
            trigger_conditions JSONB NOT NULL DEFAULT '[]',
            active_version_id UUID,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS workflow_versions (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            workflow_id UUID NOT NULL REFERENCES workflows(id),
            version_number INTEGER NOT NULL,
            nodes JSONB NOT NULL DEFAULT '[]',
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            UNIQUE (workflow_id, version_number)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS workflow_executions (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            workflow_version_id UUID NOT NULL REFERENCES workflow_versions(id),
            incident_id UUID NOT NULL REFERENCES incidents(id),
            status VARCHAR NOT NULL,
            triggered_by VARCHAR NOT NULL DEFAULT 'EVENT',
            trigger_event VARCHAR NOT NULL DEFAULT 'incident.created',
            execution_chain TEXT[] NOT NULL DEFAULT '{}',
            node_results JSONB NOT NULL DEFAULT '{}',
            error TEXT,
            started_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            finished_at TIMESTAMPTZ
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS notification_logs (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            incident_id UUID NOT NULL REFERENCES incidents(id),
            escalation_level INTEGER NOT NULL,
            recipient_id UUID NOT NULL,
            tier VARCHAR NOT NULL DEFAULT 'PRIMARY',
            channel VARCHAR NOT NULL,
            provider VARCHAR NOT NULL,
            status VARCHAR NOT NULL,
            attempt INTEGER NOT NULL DEFAULT 1,
            sent_at TIMESTAMPTZ,
            delivered_at TIMESTAMPTZ,
            error TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS webhook_deliveries (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            integration_id UUID,
            integration_name VARCHAR NOT NULL,
            status_code INTEGER NOT NULL,
            latency_ms BIGINT NOT NULL,
            bytes BIGINT NOT NULL,
            outcome VARCHAR NOT NULL,
            received_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_alerts_fingerprint ON alerts(fingerprint)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_incidents_fingerprint_open ON incidents(fingerprint) WHERE status IN ('TRIGGERED', 'ACKNOWLEDGED')")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_incidents_service_id ON incidents(service_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_notification_logs_incident_id ON notification_logs(incident_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_workflow_executions_incident_id ON workflow_executions(incident_id)")
        .execute(pool)
        .await?;

    tracing::info!("postgres migrations completed");
    Ok(())
}

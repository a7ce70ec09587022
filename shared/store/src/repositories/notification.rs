//! Notification dispatch log storage.
//!
//! Two implementations exist behind [`NotificationLogStore`]:
//! [`PostgresNotificationLogStore`] guards every status write with a
//! `WHERE` clause on the row's current stored status, so a write can only
//! land if it is a legal advance per [`NotificationStatus::can_transition_to`];
//! [`InMemoryNotificationLogStore`] applies the same guard in memory for
//! tests that don't need a live Postgres instance.

use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use beacon_models::notification::{NotificationLog, NotificationStatus};
use sqlx::PgPool;
use tokio::sync::RwLock;
use uuid::Uuid;

#[async_trait]
pub trait NotificationLogStore: Send + Sync {
    async fn create(&self, log: &NotificationLog) -> Result<()>;

    /// Conditional status transition: only applies if `log.status` is a
    /// legal advance (`NotificationStatus::can_transition_to`) from the
    /// row's current stored status. A regression attempt - e.g. a
    /// delivery-status webhook reporting `FAILED` after the log already
    /// reconciled to `DELIVERED` - is a silent no-op rather than an
    /// overwrite. Returns whether this call's write actually landed.
    async fn update_status(&self, id: Uuid, log: &NotificationLog) -> Result<bool>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<NotificationLog>>;
    async fn find_for_tier(&self, incident_id: Uuid, escalation_level: i32, tier: &str) -> Result<Vec<NotificationLog>>;
    async fn find_for_incident(&self, incident_id: Uuid) -> Result<Vec<NotificationLog>>;

    /// Most recent dispatch addressed to `recipient_id`, used to resolve
    /// which incident an inbound reply (SMS text, IVR digits, Slack
    /// interaction) is about when the provider webhook carries no
    /// incident id of its own.
    async fn latest_for_recipient(&self, recipient_id: Uuid) -> Result<Option<NotificationLog>>;

    /// Counts distinct channels that reached a terminal FAILED state for
    /// the given escalation level - the signal the dispatcher checks
    /// against the "≥2 channels failed" tier-escalation condition.
    async fn failed_channel_count(&self, incident_id: Uuid, escalation_level: i32, tier: &str) -> Result<i64>;
}

pub struct PostgresNotificationLogStore {
    pool: PgPool,
}

impl PostgresNotificationLogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationLogStore for PostgresNotificationLogStore {
    async fn create(&self, log: &NotificationLog) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO notification_logs
                (id, incident_id, escalation_level, recipient_id, tier, channel, provider, status, attempt, sent_at, delivered_at, error)
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12)
            "#,
        )
        .bind(log.id)
        .bind(log.incident_id)
        .bind(log.escalation_level)
        .bind(log.recipient_id)
        .bind(log.tier.to_string())
        .bind(log.channel.to_string())
        .bind(&log.provider)
        .bind(log.status.to_string())
        .bind(log.attempt)
        .bind(log.sent_at)
        .bind(log.delivered_at)
        .bind(&log.error)
        .execute(&self.pool)
        .await
        .context("insert notification log")?;
        Ok(())
    }

    /// The `WHERE` clause mirrors `NotificationStatus::can_transition_to`
    /// exactly: `SENT` only lands over `PENDING`, `DELIVERED` only over
    /// `SENT`, and `FAILED` over either - never over an already-terminal
    /// `DELIVERED`/`FAILED` row.
    async fn update_status(&self, id: Uuid, log: &NotificationLog) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE notification_logs
            SET status = $2, sent_at = $3, delivered_at = $4, error = $5, provider = $6
            WHERE id = $1
              AND (
                ($2 = 'SENT' AND status = 'PENDING')
                OR ($2 = 'FAILED' AND status IN ('PENDING', 'SENT'))
                OR ($2 = 'DELIVERED' AND status = 'SENT')
              )
            "#,
        )
        .bind(id)
        .bind(log.status.to_string())
        .bind(log.sent_at)
        .bind(log.delivered_at)
        .bind(&log.error)
        .bind(&log.provider)
        .execute(&self.pool)
        .await
        .context("conditional update notification log status")?;
        Ok(result.rows_affected() == 1)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<NotificationLog>> {
        let row: Option<NotificationLog> = sqlx::query_as("SELECT * FROM notification_logs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("find notification log by id")?;
        Ok(row)
    }

    async fn find_for_tier(&self, incident_id: Uuid, escalation_level: i32, tier: &str) -> Result<Vec<NotificationLog>> {
        let rows: Vec<NotificationLog> = sqlx::query_as(
            "SELECT * FROM notification_logs WHERE incident_id = $1 AND escalation_level = $2 AND tier = $3 ORDER BY attempt ASC",
        )
        .bind(incident_id)
        .bind(escalation_level)
        .bind(tier)
        .fetch_all(&self.pool)
        .await
        .context("find notification logs for tier")?;
        Ok(rows)
    }

    async fn find_for_incident(&self, incident_id: Uuid) -> Result<Vec<NotificationLog>> {
        let rows: Vec<NotificationLog> = sqlx::query_as(
            "SELECT * FROM notification_logs WHERE incident_id = $1 ORDER BY escalation_level ASC, attempt ASC",
        )
        .bind(incident_id)
        .fetch_all(&self.pool)
        .await
        .context("find notification logs for incident")?;
        Ok(rows)
    }

    async fn latest_for_recipient(&self, recipient_id: Uuid) -> Result<Option<NotificationLog>> {
        let row: Option<NotificationLog> = sqlx::query_as(
            "SELECT * FROM notification_logs WHERE recipient_id = $1 ORDER BY sent_at DESC NULLS LAST, attempt DESC LIMIT 1",
        )
        .bind(recipient_id)
        .fetch_optional(&self.pool)
        .await
        .context("find latest notification log for recipient")?;
        Ok(row)
    }

    async fn failed_channel_count(&self, incident_id: Uuid, escalation_level: i32, tier: &str) -> Result<i64> {
        let count: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(DISTINCT channel) FROM notification_logs
            WHERE incident_id = $1 AND escalation_level = $2 AND tier = $3 AND status = 'FAILED'
            "#,
        )
        .bind(incident_id)
        .bind(escalation_level)
        .bind(tier)
        .fetch_one(&self.pool)
        .await
        .context("count failed channels")?;
        Ok(count.0)
    }
}

/// In-memory notification log store for tests, enforcing the same
/// compare-and-set discipline as the Postgres adapter without a database.
#[derive(Default)]
pub struct InMemoryNotificationLogStore {
    logs: RwLock<HashMap<Uuid, NotificationLog>>,
}

impl InMemoryNotificationLogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationLogStore for InMemoryNotificationLogStore {
    async fn create(&self, log: &NotificationLog) -> Result<()> {
        self.logs.write().await.insert(log.id, log.clone());
        Ok(())
    }

    async fn update_status(&self, id: Uuid, log: &NotificationLog) -> Result<bool> {
        let mut logs = self.logs.write().await;
        let Some(existing) = logs.get_mut(&id) else {
            return Ok(false);
        };
        if !existing.status.can_transition_to(log.status) {
            return Ok(false);
        }
        existing.status = log.status;
        existing.sent_at = log.sent_at;
        existing.delivered_at = log.delivered_at;
        existing.error = log.error.clone();
        existing.provider = log.provider.clone();
        Ok(true)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<NotificationLog>> {
        Ok(self.logs.read().await.get(&id).cloned())
    }

    async fn find_for_tier(&self, incident_id: Uuid, escalation_level: i32, tier: &str) -> Result<Vec<NotificationLog>> {
        let mut found: Vec<NotificationLog> = self
            .logs
            .read()
            .await
            .values()
            .filter(|l| l.incident_id == incident_id && l.escalation_level == escalation_level && l.tier.to_string() == tier)
            .cloned()
            .collect();
        found.sort_by_key(|l| l.attempt);
        Ok(found)
    }

    async fn find_for_incident(&self, incident_id: Uuid) -> Result<Vec<NotificationLog>> {
        let mut found: Vec<NotificationLog> = self.logs.read().await.values().filter(|l| l.incident_id == incident_id).cloned().collect();
        found.sort_by_key(|l| (l.escalation_level, l.attempt));
        Ok(found)
    }

    async fn latest_for_recipient(&self, recipient_id: Uuid) -> Result<Option<NotificationLog>> {
        Ok(self
            .logs
            .read()
            .await
            .values()
            .filter(|l| l.recipient_id == recipient_id)
            .max_by_key(|l| l.sent_at)
            .cloned())
    }

    async fn failed_channel_count(&self, incident_id: Uuid, escalation_level: i32, tier: &str) -> Result<i64> {
        let channels: std::collections::HashSet<_> = self
            .logs
            .read()
            .await
            .values()
            .filter(|l| {
                l.incident_id == incident_id
                    && l.escalation_level == escalation_level
                    && l.tier.to_string() == tier
                    && l.status == NotificationStatus::Failed
            })
            .map(|l| l.channel)
            .collect();
        Ok(channels.len() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_models::notification::NotificationTier;
    use beacon_models::team::NotificationChannelKind;

    fn pending_log() -> NotificationLog {
        NotificationLog::pending(Uuid::new_v4(), 1, Uuid::new_v4(), NotificationTier::Primary, NotificationChannelKind::Sms, "twilio".into())
    }

    #[tokio::test]
    async fn update_status_advances_pending_to_sent_to_delivered() {
        let store = InMemoryNotificationLogStore::new();
        let mut log = pending_log();
        store.create(&log).await.unwrap();

        log.status = NotificationStatus::Sent;
        assert!(store.update_status(log.id, &log).await.unwrap());

        log.status = NotificationStatus::Delivered;
        assert!(store.update_status(log.id, &log).await.unwrap());

        let stored = store.find_by_id(log.id).await.unwrap().unwrap();
        assert_eq!(stored.status, NotificationStatus::Delivered);
    }

    #[tokio::test]
    async fn late_failed_reconciliation_cannot_regress_an_already_delivered_log() {
        let store = InMemoryNotificationLogStore::new();
        let mut log = pending_log();
        store.create(&log).await.unwrap();

        log.status = NotificationStatus::Sent;
        store.update_status(log.id, &log).await.unwrap();
        log.status = NotificationStatus::Delivered;
        store.update_status(log.id, &log).await.unwrap();

        // A stale FAILED webhook arrives after DELIVERED already landed.
        let mut stale = log.clone();
        stale.status = NotificationStatus::Failed;
        let applied = store.update_status(stale.id, &stale).await.unwrap();

        assert!(!applied, "a regression write must be rejected");
        let stored = store.find_by_id(log.id).await.unwrap().unwrap();
        assert_eq!(stored.status, NotificationStatus::Delivered, "DELIVERED must remain terminal");
    }

    #[tokio::test]
    async fn late_delivered_reconciliation_cannot_revive_an_already_failed_log() {
        let store = InMemoryNotificationLogStore::new();
        let mut log = pending_log();
        store.create(&log).await.unwrap();

        log.status = NotificationStatus::Failed;
        store.update_status(log.id, &log).await.unwrap();

        let mut stale = log.clone();
        stale.status = NotificationStatus::Delivered;
        let applied = store.update_status(stale.id, &stale).await.unwrap();

        assert!(!applied, "a late DELIVERED cannot override a terminal FAILED");
        let stored = store.find_by_id(log.id).await.unwrap().unwrap();
        assert_eq!(stored.status, NotificationStatus::Failed);
    }

    #[tokio::test]
    async fn failed_channel_count_counts_distinct_channels_not_attempts() {
        let store = InMemoryNotificationLogStore::new();
        let incident_id = Uuid::new_v4();

        let mut sms = NotificationLog::pending(incident_id, 1, Uuid::new_v4(), NotificationTier::Primary, NotificationChannelKind::Sms, "twilio".into());
        sms.status = NotificationStatus::Failed;
        store.create(&sms).await.unwrap();

        let mut sms_retry = NotificationLog::pending(incident_id, 1, Uuid::new_v4(), NotificationTier::Primary, NotificationChannelKind::Sms, "twilio".into());
        sms_retry.status = NotificationStatus::Failed;
        store.create(&sms_retry).await.unwrap();

        let count = store.failed_channel_count(incident_id, 1, "PRIMARY").await.unwrap();
        assert_eq!(count, 1, "two failed logs on the same channel count once");
    }
}

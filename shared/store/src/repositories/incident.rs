//! Incident storage, including the dedup-critical "find the open incident
//! for this fingerprint, or create one" operation.
//!
//! Two implementations exist behind [`IncidentStore`]: [`PostgresIncidentStore`]
//! uses a `SELECT ... FOR UPDATE` inside a `SERIALIZABLE` transaction;
//! [`InMemoryIncidentStore`] is for tests and emulates the same atomicity
//! with a per-fingerprint `tokio::sync::Mutex` so dedup races can be
//! exercised without a database.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use beacon_models::incident::Incident;
#[cfg(test)]
use chrono::Utc;
use sqlx::PgPool;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

#[async_trait]
pub trait IncidentStore: Send + Sync {
    /// Finds the open incident for `fingerprint`, or creates one via
    /// `make`. When an existing incident is found it is merged (alert
    /// count incremented, re-triggered if it was acknowledged) inside the
    /// same locked transaction, so the increment is never lost to a race
    /// with whoever released the row lock. Returns the incident and whether it was
    /// newly created.
    async fn find_or_create(
        &self,
        fingerprint: &str,
        window: chrono::Duration,
        now: chrono::DateTime<chrono::Utc>,
        make: Box<dyn FnOnce() -> Incident + Send>,
    ) -> Result<(Incident, bool)>;

    async fn get(&self, id: Uuid) -> Result<Option<Incident>>;
    async fn save(&self, incident: &Incident) -> Result<()>;
    async fn find_open_by_fingerprint(&self, fingerprint: &str) -> Result<Option<Incident>>;

    /// `true` iff this caller's ack won the race.
    async fn try_acknowledge(&self, id: Uuid, by: Uuid, now: chrono::DateTime<chrono::Utc>) -> Result<bool>;
    async fn try_resolve(&self, id: Uuid, by: Option<Uuid>, now: chrono::DateTime<chrono::Utc>) -> Result<bool>;
}

pub struct PostgresIncidentStore {
    pool: PgPool,
}

impl PostgresIncidentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IncidentStore for PostgresIncidentStore {
    async fn find_or_create(
        &self,
        fingerprint: &str,
        window: chrono::Duration,
        now: chrono::DateTime<chrono::Utc>,
        make: Box<dyn FnOnce() -> Incident + Send>,
    ) -> Result<(Incident, bool)> {
        let mut tx = self.pool.begin().await.context("begin dedup transaction")?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .context("set serializable isolation")?;

        let cutoff = now - window;
        let existing: Option<Incident> = sqlx::query_as(
            r#"
            SELECT * FROM incidents
            WHERE fingerprint = $1 AND status IN ('TRIGGERED', 'ACKNOWLEDGED') AND created_at >= $2
            ORDER BY created_at DESC
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(fingerprint)
        .bind(cutoff)
        .fetch_optional(&mut *tx)
        .await
        .context("lock existing incident by fingerprint")?;

        let (mut incident, created) = match existing {
            Some(incident) => (incident, false),
            None => (make(), true),
        };

        if created {
            sqlx::query(
                r#"
                INSERT INTO incidents (
                    id, service_id, title, severity, status, fingerprint,
                    alert_count, escalation_policy_id, current_escalation_level,
                    current_repeat, acknowledged_by, acknowledged_at, resolved_by, resolved_at,
                    created_at, updated_at
                ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16)
                "#,
            )
            .bind(incident.id)
            .bind(incident.service_id)
            .bind(&incident.title)
            .bind(incident.severity.as_str())
            .bind(incident.status.to_string())
            .bind(&incident.fingerprint)
            .bind(incident.alert_count)
            .bind(incident.escalation_policy_id)
            .bind(incident.current_escalation_level)
            .bind(incident.current_repeat)
            .bind(incident.acknowledged_by)
            .bind(incident.acknowledged_at)
            .bind(incident.resolved_by)
            .bind(incident.resolved_at)
            .bind(incident.created_at)
            .bind(incident.updated_at)
            .execute(&mut *tx)
            .await
            .context("insert new incident")?;
        } else {
            incident.merge_alert(now);
            sqlx::query(
                r#"
                UPDATE incidents SET
                    status = $2, alert_count = $3, acknowledged_by = $4,
                    acknowledged_at = $5, updated_at = $6
                WHERE id = $1
                "#,
            )
            .bind(incident.id)
            .bind(incident.status.to_string())
            .bind(incident.alert_count)
            .bind(incident.acknowledged_by)
            .bind(incident.acknowledged_at)
            .bind(incident.updated_at)
            .execute(&mut *tx)
            .await
            .context("merge alert into existing incident")?;
        }

        tx.commit().await.context("commit dedup transaction")?;
        Ok((incident, created))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Incident>> {
        let row: Option<Incident> = sqlx::query_as("SELECT * FROM incidents WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("fetch incident by id")?;
        Ok(row)
    }

    async fn save(&self, incident: &Incident) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE incidents SET
                status = $2, alert_count = $3, current_escalation_level = $4,
                current_repeat = $5, acknowledged_by = $6, acknowledged_at = $7,
                resolved_by = $8, resolved_at = $9, updated_at = $10
            WHERE id = $1
            "#,
        )
        .bind(incident.id)
        .bind(incident.status.to_string())
        .bind(incident.alert_count)
        .bind(incident.current_escalation_level)
        .bind(incident.current_repeat)
        .bind(incident.acknowledged_by)
        .bind(incident.acknowledged_at)
        .bind(incident.resolved_by)
        .bind(incident.resolved_at)
        .bind(incident.updated_at)
        .execute(&self.pool)
        .await
        .context("update incident")?;
        Ok(())
    }

    /// Atomic conditional acknowledge: only succeeds if the incident is
    /// still TRIGGERED, so two concurrent acks race-resolve to exactly
    /// one winner.
    async fn try_acknowledge(&self, id: Uuid, by: Uuid, now: chrono::DateTime<chrono::Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE incidents SET status = 'ACKNOWLEDGED', acknowledged_by = $2, acknowledged_at = $3, updated_at = $3 WHERE id = $1 AND status = 'TRIGGERED'",
        )
        .bind(id)
        .bind(by)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("conditional acknowledge")?;
        Ok(result.rows_affected() == 1)
    }

    async fn try_resolve(&self, id: Uuid, by: Option<Uuid>, now: chrono::DateTime<chrono::Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE incidents SET status = 'RESOLVED', resolved_by = $2, resolved_at = $3, updated_at = $3 WHERE id = $1 AND status IN ('TRIGGERED', 'ACKNOWLEDGED')",
        )
        .bind(id)
        .bind(by)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("conditional resolve")?;
        Ok(result.rows_affected() == 1)
    }

    async fn find_open_by_fingerprint(&self, fingerprint: &str) -> Result<Option<Incident>> {
        let row: Option<Incident> = sqlx::query_as(
            "SELECT * FROM incidents WHERE fingerprint = $1 AND status IN ('TRIGGERED', 'ACKNOWLEDGED') ORDER BY created_at DESC LIMIT 1",
        )
        .bind(fingerprint)
        .fetch_optional(&self.pool)
        .await
        .context("find open incident by fingerprint")?;
        Ok(row)
    }
}

/// In-memory incident store for tests. Dedup atomicity is provided by a
/// per-fingerprint lock rather than a single global one, so unrelated
/// fingerprints can be deduped concurrently — matching the
/// per-row-lock granularity `FOR UPDATE` gives in Postgres.
#[derive(Default)]
pub struct InMemoryIncidentStore {
    incidents: RwLock<HashMap<Uuid, Incident>>,
    fingerprint_locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
}

impl InMemoryIncidentStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn lock_for(&self, fingerprint: &str) -> Arc<Mutex<()>> {
        if let Some(lock) = self.fingerprint_locks.read().await.get(fingerprint) {
            return lock.clone();
        }
        let mut guard = self.fingerprint_locks.write().await;
        guard
            .entry(fingerprint.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[async_trait]
impl IncidentStore for InMemoryIncidentStore {
    async fn find_or_create(
        &self,
        fingerprint: &str,
        window: chrono::Duration,
        now: chrono::DateTime<chrono::Utc>,
        make: Box<dyn FnOnce() -> Incident + Send>,
    ) -> Result<(Incident, bool)> {
        let lock = self.lock_for(fingerprint).await;
        let _guard = lock.lock().await;

        let cutoff = now - window;
        let candidate = self
            .incidents
            .read()
            .await
            .values()
            .filter(|i| i.fingerprint == fingerprint && i.status.is_open() && i.created_at >= cutoff)
            .max_by_key(|i| i.created_at)
            .cloned();

        if let Some(mut existing) = candidate {
            existing.merge_alert(now);
            self.incidents.write().await.insert(existing.id, existing.clone());
            return Ok((existing, false));
        }
        let incident = make();
        self.incidents.write().await.insert(incident.id, incident.clone());
        Ok((incident, true))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Incident>> {
        Ok(self.incidents.read().await.get(&id).cloned())
    }

    async fn save(&self, incident: &Incident) -> Result<()> {
        self.incidents.write().await.insert(incident.id, incident.clone());
        Ok(())
    }

    async fn try_acknowledge(&self, id: Uuid, by: Uuid, now: chrono::DateTime<chrono::Utc>) -> Result<bool> {
        let mut incidents = self.incidents.write().await;
        let Some(incident) = incidents.get_mut(&id) else {
            return Ok(false);
        };
        Ok(incident.acknowledge(by, now))
    }

    async fn try_resolve(&self, id: Uuid, by: Option<Uuid>, now: chrono::DateTime<chrono::Utc>) -> Result<bool> {
        let mut incidents = self.incidents.write().await;
        let Some(incident) = incidents.get_mut(&id) else {
            return Ok(false);
        };
        Ok(incident.resolve(by, now))
    }

    async fn find_open_by_fingerprint(&self, fingerprint: &str) -> Result<Option<Incident>> {
        let found = self
            .incidents
            .read()
            .await
            .values()
            .filter(|i| i.fingerprint == fingerprint && i.status.is_open())
            .max_by_key(|i| i.created_at)
            .cloned();
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_models::alert::Severity;

    fn make_incident() -> Incident {
        Incident::new(Uuid::new_v4(), "db down".into(), Severity::Critical, "fp-shared".into(), Uuid::new_v4(), Utc::now())
    }

    #[tokio::test]
    async fn concurrent_find_or_create_yields_single_incident() {
        let store = Arc::new(InMemoryIncidentStore::new());
        let fingerprint = "fp-shared";

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .find_or_create(fingerprint, chrono::Duration::minutes(15), Utc::now(), Box::new(make_incident))
                    .await
                    .unwrap()
            }));
        }

        let mut ids = std::collections::HashSet::new();
        let mut created_count = 0;
        for handle in handles {
            let (incident, created) = handle.await.unwrap();
            ids.insert(incident.id);
            if created {
                created_count += 1;
            }
        }

        assert_eq!(ids.len(), 1, "all racing calls must resolve to the same incident");
        assert_eq!(created_count, 1, "exactly one caller should have created the incident");
    }

    #[tokio::test]
    async fn second_alert_for_same_fingerprint_merges_instead_of_creating() {
        let store = InMemoryIncidentStore::new();
        let (first, created) = store.find_or_create("fp-merge", chrono::Duration::minutes(15), Utc::now(), Box::new(make_incident)).await.unwrap();
        assert!(created);
        assert_eq!(first.alert_count, 1);

        let (second, created) = store.find_or_create("fp-merge", chrono::Duration::minutes(15), Utc::now(), Box::new(make_incident)).await.unwrap();
        assert!(!created);
        assert_eq!(second.id, first.id);
        assert_eq!(second.alert_count, 2);
    }
}

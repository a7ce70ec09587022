//! Deduplicator worker: consumes `dedupe` jobs produced by
//! ingestion, routes the alert to its owning team/policy, and folds it
//! into the open incident for its fingerprint — or creates a new one —
//! inside the dedup-critical transaction `IncidentStore::find_or_create`
//! already provides.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use beacon_ingestion::state::DedupeJob;
use beacon_models::incident::Incident;
use beacon_models::lifecycle::{LifecycleEvent, LifecycleEventType};
use beacon_queue::{topics, Job, JobQueue, SharedJobQueue};
use beacon_routing::Router;
use beacon_store::{AlertRepository, IncidentStore, IntegrationRepository};
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub alerts: Arc<AlertRepository>,
    pub integrations: Arc<IntegrationRepository>,
    pub incidents: Arc<dyn IncidentStore>,
    pub router: Arc<Router>,
    pub dedupe_queue: SharedJobQueue<DedupeJob>,
    pub lifecycle_queue: SharedJobQueue<LifecycleEvent>,
}

/// Placeholder service id for incidents routed through the team-tag
/// fallback, which resolves a team but no specific `Service`. A nil uuid keeps the non-nullable `incidents.service_id`
/// column honest about "routed, but not to a named service" without
/// widening the column to `Option<Uuid>` for the common case.
const UNASSIGNED_SERVICE: Uuid = Uuid::nil();

pub async fn process_job(state: &AppState, job: &Job<DedupeJob>) -> Result<()> {
    let Some(alert) = state.alerts.find_by_id(job.payload.alert_id).await.context("load alert")? else {
        warn!(alert_id = %job.payload.alert_id, "dedupe job references a missing alert, dropping");
        return Ok(());
    };

    let integration = state
        .integrations
        .find_by_id(alert.integration_id)
        .await
        .context("load integration")?
        .context("alert references a missing integration")?;

    let now = Utc::now();
    let route = state
        .router
        .route(&alert.metadata, Some(integration.service_id), now)
        .await
        .context("route alert")?;

    let window = chrono::Duration::minutes(integration.dedup_window_minutes as i64);
    let service_id = route.service_id.unwrap_or(UNASSIGNED_SERVICE);
    let title = alert.title.clone();
    let severity = alert.severity;
    let fingerprint = alert.fingerprint.clone();
    let escalation_policy_id = route.escalation_policy_id;

    let (incident, created) = state
        .incidents
        .find_or_create(
            &fingerprint,
            window,
            now,
            Box::new(move || Incident::new(service_id, title, severity, fingerprint, escalation_policy_id, now)),
        )
        .await
        .context("find or create incident")?;

    state.alerts.link_incident(alert.id, incident.id).await.context("link alert to incident")?;

    if created {
        info!(incident_id = %incident.id, alert_id = %alert.id, "incident created");
        let event = LifecycleEvent::new(LifecycleEventType::IncidentCreated, incident.id, now);
        if let Err(err) = state.lifecycle_queue.enqueue(Job::new(topics::LIFECYCLE_EVENTS, event, now, 5)).await {
            warn!(error = %err, incident_id = %incident.id, "failed to enqueue incident.created lifecycle event");
        }
    } else {
        info!(incident_id = %incident.id, alert_id = %alert.id, alert_count = incident.alert_count, "alert merged into existing incident");
    }

    Ok(())
}

/// Polls `dedupe` for due jobs and processes them, rescheduling on
/// failure with exponential backoff until `max_attempts` is exhausted.
pub async fn run_worker(state: AppState, poll_interval: Duration) -> ! {
    loop {
        let now = Utc::now();
        match state.dedupe_queue.pop_due(topics::DEDUPE, now).await {
            Ok(jobs) => {
                for job in jobs {
                    if let Err(err) = process_job(&state, &job).await {
                        warn!(error = %err, job_id = %job.id, attempt = job.attempt, "dedupe job failed");
                        if !job.exhausted() {
                            let mut retry = job.clone();
                            retry.attempt += 1;
                            retry.due_at = now + chrono::Duration::from_std(beacon_queue::backoff_delay(retry.attempt, Duration::from_secs(2), Duration::from_secs(60))).unwrap_or_default();
                            if let Err(err) = state.dedupe_queue.enqueue(retry).await {
                                warn!(error = %err, job_id = %job.id, "failed to reschedule dedupe job");
                            }
                        } else {
                            warn!(job_id = %job.id, alert_id = %job.payload.alert_id, "dedupe job exhausted retries, dropping");
                        }
                    }
                }
            }
            Err(err) => warn!(error = %err, "failed to poll dedupe queue"),
        }
        tokio::time::sleep(poll_interval).await;
    }
}

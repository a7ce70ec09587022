//! Escalation Engine: a per-incident FSM
//! (`AWAITING_ACK(level, repeat)` / `ACKNOWLEDGED` / `RESOLVED` /
//! `EXHAUSTED`) driven by two inputs — `incident.created` lifecycle
//! events that start the ladder, and `escalation_timeout` jobs that walk
//! it. Acknowledge/resolve are not separate inputs this engine reacts to:
//! they are enforced by the stale-timer guard at timeout-consumption time
//! ("any in-flight timer whose (level, repeat) no longer
//! matches the incident's current state is discarded on dequeue").

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use beacon_models::incident::Incident;
use beacon_models::lifecycle::{LifecycleEvent, LifecycleEventType};
use beacon_models::notification::NotificationTier;
use beacon_queue::{topics, EscalationTimeoutJob, Job, JobQueue, NotificationDispatchJob, SharedJobQueue};
use beacon_routing::Router;
use beacon_store::IncidentStore;
use chrono::Utc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub incidents: Arc<dyn IncidentStore>,
    pub router: Arc<Router>,
    pub lifecycle_queue: SharedJobQueue<LifecycleEvent>,
    pub timeout_queue: SharedJobQueue<EscalationTimeoutJob>,
    pub notification_queue: SharedJobQueue<NotificationDispatchJob>,
}

/// Notifies `level_index`'s (1-based, matching `Incident::current_escalation_level`)
/// current target and schedules the timeout that fires if nobody acks in
/// time. Called both when an incident is first created and every time
/// the ladder advances.
async fn start_level(state: &AppState, incident: &Incident, level_index: i32, repeat: i32, now: chrono::DateTime<Utc>) -> Result<()> {
    let levels = state.router.levels(incident.escalation_policy_id).await.context("load escalation levels")?;
    let Some(level) = levels.get((level_index - 1).max(0) as usize) else {
        warn!(incident_id = %incident.id, level = level_index, "escalation level out of range, cannot advance further");
        return Ok(());
    };

    let policy = state.router.policy(incident.escalation_policy_id).await.context("load escalation policy")?;
    let Some(policy) = policy else {
        warn!(incident_id = %incident.id, "escalation policy missing, cannot resolve target team");
        return Ok(());
    };

    match state.router.resolve_level_target(level, policy.team_id, now).await {
        Ok(Some(user_id)) => {
            let job = NotificationDispatchJob { incident_id: incident.id, user_id, escalation_level: level_index, tier: NotificationTier::Primary };
            if let Err(err) = state.notification_queue.enqueue(Job::new(topics::NOTIFICATION_DISPATCH, job, now, 3)).await {
                warn!(error = %err, incident_id = %incident.id, "failed to enqueue notification dispatch job");
            }
        }
        Ok(None) => warn!(incident_id = %incident.id, level = level_index, "no eligible target resolved for escalation level"),
        Err(err) => warn!(error = %err, incident_id = %incident.id, level = level_index, "failed to resolve escalation level target"),
    }

    let due_at = now + chrono::Duration::minutes(level.timeout_minutes as i64);
    let timeout = EscalationTimeoutJob { incident_id: incident.id, level: level_index, repeat };
    state
        .timeout_queue
        .enqueue(Job::new(topics::ESCALATION_TIMEOUT, timeout, due_at, 3))
        .await
        .context("schedule escalation timeout")?;
    Ok(())
}

pub async fn process_lifecycle_event(state: &AppState, event: &LifecycleEvent) -> Result<()> {
    if event.event_type != LifecycleEventType::IncidentCreated {
        // Acknowledge/resolve transitions are enforced by the stale-timer
        // guard in `process_timeout`, not by reacting here.
        return Ok(());
    }

    let Some(incident) = state.incidents.get(event.incident_id).await.context("load incident")? else {
        warn!(incident_id = %event.incident_id, "incident.created event for missing incident");
        return Ok(());
    };
    if !incident.status.is_open() {
        return Ok(());
    }

    info!(incident_id = %incident.id, "starting escalation ladder");
    start_level(state, &incident, incident.current_escalation_level, incident.current_repeat, event.occurred_at).await
}

pub async fn process_timeout(state: &AppState, timeout: &EscalationTimeoutJob) -> Result<()> {
    let Some(mut incident) = state.incidents.get(timeout.incident_id).await.context("load incident")? else {
        return Ok(());
    };

    if !incident.status.is_open() {
        return Ok(());
    }
    if incident.current_escalation_level != timeout.level || incident.current_repeat != timeout.repeat {
        // Stale timer: the incident has already advanced past this rung.
        return Ok(());
    }

    let now = Utc::now();
    let levels = state.router.levels(incident.escalation_policy_id).await.context("load escalation levels")?;
    let max_level = levels.len() as i32;
    let Some(policy) = state.router.policy(incident.escalation_policy_id).await.context("load escalation policy")? else {
        warn!(incident_id = %incident.id, "escalation policy missing at timeout, cannot advance");
        return Ok(());
    };

    let (next_level, next_repeat) = if timeout.level < max_level {
        (timeout.level + 1, timeout.repeat)
    } else if timeout.repeat < policy.repeat_limit {
        (1, timeout.repeat + 1)
    } else {
        info!(incident_id = %incident.id, "escalation ladder exhausted");
        let event = LifecycleEvent::new(LifecycleEventType::EscalationExhausted, incident.id, now);
        if let Err(err) = state.lifecycle_queue.enqueue(Job::new(topics::LIFECYCLE_EVENTS, event, now, 3)).await {
            warn!(error = %err, incident_id = %incident.id, "failed to enqueue escalationExhausted lifecycle event");
        }
        return Ok(());
    };

    incident.current_escalation_level = next_level;
    incident.current_repeat = next_repeat;
    incident.updated_at = now;
    state.incidents.save(&incident).await.context("persist escalated incident state")?;

    info!(incident_id = %incident.id, level = next_level, repeat = next_repeat, "advancing escalation ladder");
    start_level(state, &incident, next_level, next_repeat, now).await
}

/// Drains `lifecycle_events` looking only for `incident.created`
/// (everything else the matcher in `services/workflow` also consumes
/// off the same topic, so this reuses the bus rather than owning it).
pub async fn run_lifecycle_worker(state: AppState, poll_interval: Duration) -> ! {
    loop {
        let now = Utc::now();
        match state.lifecycle_queue.pop_due(topics::LIFECYCLE_EVENTS, now).await {
            Ok(events) => {
                for event in events {
                    if let Err(err) = process_lifecycle_event(&state, &event.payload).await {
                        warn!(error = %err, incident_id = %event.payload.incident_id, "failed to process lifecycle event");
                    }
                }
            }
            Err(err) => warn!(error = %err, "failed to poll lifecycle events"),
        }
        tokio::time::sleep(poll_interval).await;
    }
}

/// Drains due `escalation_timeout` jobs.
pub async fn run_timeout_worker(state: AppState, poll_interval: Duration) -> ! {
    loop {
        let now = Utc::now();
        match state.timeout_queue.pop_due(topics::ESCALATION_TIMEOUT, now).await {
            Ok(jobs) => {
                for job in jobs {
                    if let Err(err) = process_timeout(&state, &job.payload).await {
                        warn!(error = %err, incident_id = %job.payload.incident_id, "failed to process escalation timeout");
                    }
                }
            }
            Err(err) => warn!(error = %err, "failed to poll escalation timeouts"),
        }
        tokio::time::sleep(poll_interval).await;
    }
}

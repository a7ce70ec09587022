//! Notification Dispatcher core: fans a
//! `NotificationDispatchJob` out across every channel in its tier, retries
//! each channel with jittered backoff, and escalates to the next tier when
//! enough channels come back failed.

use std::time::Duration;

use anyhow::{Context, Result};
use beacon_models::incident::Incident;
use beacon_models::notification::{NotificationLog, NotificationStatus, NotificationTier};
use beacon_models::team::NotificationChannelKind;
use beacon_providers::SendPayload;
use beacon_queue::{backoff_delay, topics, Job, JobQueue, NotificationDispatchJob};
use beacon_store::IncidentStore;
use chrono::Utc;
use rand::Rng;
use tracing::{info, warn};

use crate::state::AppState;

const MAX_ATTEMPTS: u32 = 3;
const RETRY_BASE: Duration = Duration::from_secs(5);
const RETRY_CAP: Duration = Duration::from_secs(60);
const RETRY_JITTER: f64 = 0.2;

/// Channel kinds paged for a tier.
pub fn channels_for_tier(tier: NotificationTier) -> &'static [NotificationChannelKind] {
    match tier {
        NotificationTier::Primary => &[NotificationChannelKind::Email, NotificationChannelKind::Slack, NotificationChannelKind::Push],
        NotificationTier::Secondary => &[NotificationChannelKind::Sms],
        NotificationTier::Tertiary => &[NotificationChannelKind::Voice],
    }
}

fn build_payload(incident: &Incident, recipient: &str) -> SendPayload {
    let subject = format!("[{}] {}", incident.severity, incident.title);
    let body = format!(
        "Incident {} ({}): {}\nReply \"ack {}\" to acknowledge or \"resolve {}\" to resolve.",
        incident.id, incident.severity, incident.title, incident.id, incident.id
    );
    SendPayload { recipient: recipient.to_string(), subject, body, metadata: serde_json::json!({"incident_id": incident.id}) }
}

fn jittered_backoff(attempt: u32) -> Duration {
    let base = backoff_delay(attempt, RETRY_BASE, RETRY_CAP);
    let jitter = rand::thread_rng().gen_range(-RETRY_JITTER..=RETRY_JITTER);
    let millis = (base.as_millis() as f64 * (1.0 + jitter)).max(0.0);
    Duration::from_millis(millis as u64)
}

/// Sends one channel to one recipient, retrying up to `MAX_ATTEMPTS` times
/// with jittered exponential backoff before recording a terminal FAILED
/// log. Returns whether the channel ultimately delivered.
async fn send_with_retry(state: &AppState, incident: &Incident, job: &NotificationDispatchJob, kind: NotificationChannelKind, address: &str) -> Result<bool> {
    let provider_name = state.registry.get(kind).map(|c| c.name().to_string()).unwrap_or_else(|| kind.to_string());
    let mut log = NotificationLog::pending(incident.id, job.escalation_level, job.user_id, job.tier, kind, provider_name);
    state.notification_logs.create(&log).await.context("create pending notification log")?;

    let payload = build_payload(incident, address);
    let mut last_error = None;
    for attempt in 0..MAX_ATTEMPTS {
        match state.registry.send(kind, &payload).await {
            Ok(outcome) => {
                log.status = NotificationStatus::Sent;
                log.sent_at = Some(Utc::now());
                log.delivered_at = outcome.delivered_at;
                if let Some(provider_id) = outcome.provider_id {
                    log.provider = provider_id;
                }
                let applied = state.notification_logs.update_status(log.id, &log).await.context("record sent notification")?;
                if !applied {
                    warn!(incident_id = %incident.id, channel = %kind, log_id = %log.id, "sent status did not apply, log already advanced past PENDING");
                }
                return Ok(true);
            }
            Err(err) => {
                warn!(incident_id = %incident.id, channel = %kind, attempt = attempt + 1, error = %err, "notification attempt failed");
                last_error = Some(err);
                if attempt + 1 < MAX_ATTEMPTS {
                    tokio::time::sleep(jittered_backoff(attempt)).await;
                }
            }
        }
    }

    log.status = NotificationStatus::Failed;
    log.error = last_error.map(|e| e.to_string());
    let applied = state.notification_logs.update_status(log.id, &log).await.context("record failed notification")?;
    if !applied {
        warn!(incident_id = %incident.id, channel = %kind, log_id = %log.id, "failed status did not apply, log already reached a terminal state");
    }
    Ok(false)
}

/// Processes one `(incident, user, tier)` dispatch job: pages every
/// channel the tier defines that the recipient has a contact method for,
/// waits for all of them, and escalates to the next tier if enough came
/// back failed.
pub async fn process_dispatch_job(state: &AppState, job: &NotificationDispatchJob) -> Result<()> {
    let Some(incident) = state.incidents.get(job.incident_id).await.context("load incident")? else {
        warn!(incident_id = %job.incident_id, "notification dispatch job for missing incident");
        return Ok(());
    };
    if !incident.status.is_open() {
        return Ok(());
    }
    let Some(member) = state.team_members.find_by_id(job.user_id).await.context("load recipient")? else {
        warn!(user_id = %job.user_id, "notification dispatch job for missing team member");
        return Ok(());
    };

    let tier_channels = channels_for_tier(job.tier);
    let mut sends = Vec::with_capacity(tier_channels.len());
    for &kind in tier_channels {
        if let Some(contact) = member.contacts_for(kind).first() {
            sends.push(send_with_retry(state, &incident, job, kind, &contact.address));
        }
    }

    if sends.is_empty() {
        warn!(incident_id = %incident.id, user_id = %member.id, tier = %job.tier, "recipient has no contact method for any channel in this tier");
        return Ok(());
    }

    let results = futures::future::join_all(sends).await;
    let mut any_succeeded = false;
    for result in &results {
        match result {
            Ok(true) => any_succeeded = true,
            Ok(false) => {}
            Err(err) => warn!(error = %err, incident_id = %incident.id, "notification channel task errored"),
        }
    }
    if any_succeeded {
        return Ok(());
    }

    let failed = state
        .notification_logs
        .failed_channel_count(incident.id, job.escalation_level, &job.tier.to_string())
        .await
        .context("count failed channels")?;
    let escalate_threshold = tier_channels.len().min(2) as i64;
    if failed < escalate_threshold {
        return Ok(());
    }

    match job.tier.next() {
        Some(next_tier) => {
            info!(incident_id = %incident.id, from = %job.tier, to = %next_tier, "escalating to next notification tier after channel failure");
            let next_job = NotificationDispatchJob { incident_id: incident.id, user_id: job.user_id, escalation_level: job.escalation_level, tier: next_tier };
            state
                .notification_queue
                .enqueue(Job::new(topics::NOTIFICATION_DISPATCH, next_job, Utc::now(), 3))
                .await
                .context("enqueue next-tier dispatch job")?;
        }
        None => warn!(incident_id = %incident.id, "tertiary notification tier exhausted with no surviving channel"),
    }
    Ok(())
}

/// Drains due `notification_dispatch` jobs.
pub async fn run_worker(state: AppState, poll_interval: Duration) -> ! {
    loop {
        let now = Utc::now();
        match state.notification_queue.pop_due(topics::NOTIFICATION_DISPATCH, now).await {
            Ok(jobs) => {
                for job in jobs {
                    if let Err(err) = process_dispatch_job(&state, &job.payload).await {
                        warn!(error = %err, incident_id = %job.payload.incident_id, "failed to process notification dispatch job");
                    }
                }
            }
            Err(err) => warn!(error = %err, "failed to poll notification dispatch jobs"),
        }
        tokio::time::sleep(poll_interval).await;
    }
}

//! Inbound provider webhooks: Twilio SMS/voice replies and
//! Slack interactive buttons/slash commands, translated into
//! acknowledge/resolve calls once the sender is verified to both own the
//! webhook (signature check) and own the contact address it claims to
//! reply from; plus Twilio's asynchronous delivery-status callback,
//! which reconciles a `NotificationLog` from SENT to its eventual
//! DELIVERED/FAILED outcome.

use std::collections::BTreeMap;

use axum::extract::{Form, Path, State};
use axum::http::{HeaderMap, StatusCode};
use base64::Engine;
use beacon_models::lifecycle::{LifecycleEvent, LifecycleEventType};
use beacon_models::notification::NotificationStatus;
use beacon_models::team::NotificationChannelKind;
use beacon_queue::{topics, Job, JobQueue};
use beacon_store::IncidentStore;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{info, warn};
use uuid::Uuid;

use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InboundAction {
    Acknowledge,
    Resolve,
}

fn parse_action(text: &str) -> Option<InboundAction> {
    let lowered = text.to_lowercase();
    if lowered.contains("resolve") {
        Some(InboundAction::Resolve)
    } else if lowered.contains("ack") {
        Some(InboundAction::Acknowledge)
    } else {
        None
    }
}

/// An explicit incident id embedded in the reply text, if the sender typed
/// one (e.g. a Slack slash command `/resolve <incident-id>`).
fn extract_incident_id(text: &str) -> Option<Uuid> {
    text.split_whitespace().find_map(|token| Uuid::parse_str(token.trim_matches(|c: char| !c.is_alphanumeric() && c != '-')).ok())
}

/// Twilio's request signature: base64(HMAC-SHA1(authToken, url ++
/// sorted_key_value_pairs)), verified over the exact URL Twilio was
/// configured to call and the form parameters it posted.
fn verify_twilio_signature(auth_token: &str, url: &str, params: &BTreeMap<String, String>, signature_header: &str) -> bool {
    let mut data = url.to_string();
    for (key, value) in params {
        data.push_str(key);
        data.push_str(value);
    }
    let Ok(mut mac) = Hmac::<Sha1>::new_from_slice(auth_token.as_bytes()) else { return false };
    mac.update(data.as_bytes());
    let expected = mac.finalize().into_bytes();
    let Ok(provided) = base64::engine::general_purpose::STANDARD.decode(signature_header) else { return false };
    expected.as_slice().len() == provided.len() && expected.as_slice().ct_eq(&provided).into()
}

/// Slack's request signature: `v0=` + hex(HMAC-SHA256(signing_secret,
/// "v0:{timestamp}:{raw_body}")), with a 5-minute replay window.
fn verify_slack_signature(signing_secret: &str, timestamp: &str, raw_body: &str, signature_header: &str, now: chrono::DateTime<Utc>) -> bool {
    let Ok(ts) = timestamp.parse::<i64>() else { return false };
    if (now.timestamp() - ts).abs() > 300 {
        return false;
    }
    let base = format!("v0:{timestamp}:{raw_body}");
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(signing_secret.as_bytes()) else { return false };
    mac.update(base.as_bytes());
    let expected = format!("v0={}", hex::encode(mac.finalize().into_bytes()));
    expected.as_bytes().len() == signature_header.as_bytes().len() && expected.as_bytes().ct_eq(signature_header.as_bytes()).into()
}

/// Resolves which team member owns `address` on `kind`, then which
/// incident the reply is about: an explicit id in the reply text wins,
/// otherwise the most recent dispatch addressed to that member stands in
/// for "the incident they were just paged about".
async fn resolve_target(state: &AppState, kind: NotificationChannelKind, address: &str, text: &str) -> anyhow::Result<Option<(Uuid, Uuid)>> {
    let Some(member) = state.team_members.find_by_contact_address(kind, address).await? else {
        return Ok(None);
    };
    if let Some(incident_id) = extract_incident_id(text) {
        return Ok(Some((member.id, incident_id)));
    }
    let Some(log) = state.notification_logs.latest_for_recipient(member.id).await? else {
        return Ok(None);
    };
    Ok(Some((member.id, log.incident_id)))
}

async fn apply_action(state: &AppState, member_id: Uuid, incident_id: Uuid, action: InboundAction) -> anyhow::Result<bool> {
    let now = Utc::now();
    let (applied, event_type) = match action {
        InboundAction::Acknowledge => (state.incidents.try_acknowledge(incident_id, member_id, now).await?, LifecycleEventType::IncidentAcknowledged),
        InboundAction::Resolve => (state.incidents.try_resolve(incident_id, Some(member_id), now).await?, LifecycleEventType::IncidentResolved),
    };
    if applied {
        let event = LifecycleEvent::new(event_type, incident_id, now);
        if let Err(err) = state.lifecycle_queue.enqueue(Job::new(topics::LIFECYCLE_EVENTS, event, now, 3)).await {
            warn!(error = %err, %incident_id, "failed to enqueue lifecycle event for inbound reply");
        }
    }
    Ok(applied)
}

pub async fn twilio_inbound(
    State(state): State<AppState>,
    Path(channel): Path<String>,
    headers: HeaderMap,
    Form(params): Form<BTreeMap<String, String>>,
) -> StatusCode {
    let kind = match channel.as_str() {
        "sms" => NotificationChannelKind::Sms,
        "voice" => NotificationChannelKind::Voice,
        _ => return StatusCode::NOT_FOUND,
    };

    let signature = match headers.get("X-Twilio-Signature").and_then(|v| v.to_str().ok()) {
        Some(sig) => sig,
        None => return StatusCode::UNAUTHORIZED,
    };
    let url = format!("{}/webhooks/twilio/{channel}", state.twilio.public_base_url);
    if !verify_twilio_signature(&state.twilio.auth_token, &url, &params, signature) {
        warn!(%channel, "rejected twilio webhook with invalid signature");
        return StatusCode::UNAUTHORIZED;
    }

    let Some(from) = params.get("From") else { return StatusCode::BAD_REQUEST };
    let text = match kind {
        NotificationChannelKind::Voice => match params.get("Digits").map(String::as_str) {
            Some("1") => "ack",
            Some("2") => "resolve",
            _ => "",
        }
        .to_string(),
        _ => params.get("Body").cloned().unwrap_or_default(),
    };
    let Some(action) = parse_action(&text) else { return StatusCode::OK };

    match resolve_target(&state, kind, from, &text).await {
        Ok(Some((member_id, incident_id))) => match apply_action(&state, member_id, incident_id, action).await {
            Ok(applied) => {
                info!(%incident_id, %channel, applied, "processed inbound twilio reply");
                StatusCode::OK
            }
            Err(err) => {
                warn!(error = %err, %incident_id, "failed to apply inbound twilio action");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        },
        Ok(None) => {
            warn!(%channel, "inbound twilio reply from unrecognized sender, ignoring");
            StatusCode::OK
        }
        Err(err) => {
            warn!(error = %err, %channel, "failed to resolve inbound twilio reply target");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Maps a Twilio status-callback field (`MessageStatus` for SMS,
/// `CallStatus` for voice) to the terminal `NotificationLog` state it
/// reconciles to. Non-terminal values (`queued`, `sending`, `ringing`,
/// `in-progress`, ...) return `None` - there is nothing to reconcile yet.
fn terminal_status_for(raw: &str) -> Option<NotificationStatus> {
    match raw.to_lowercase().as_str() {
        "delivered" | "completed" => Some(NotificationStatus::Delivered),
        "failed" | "undelivered" | "busy" | "no-answer" | "canceled" => Some(NotificationStatus::Failed),
        _ => None,
    }
}

/// Spec §4.5 step 5: "Provider delivery-status webhooks later reconcile
/// SENT → DELIVERED or SENT → FAILED". The callback URL Twilio is
/// configured with embeds the `NotificationLog` id directly, since the
/// abstract provider pool (`shared/providers`) never hands back a
/// provider-native message id to correlate against.
pub async fn twilio_delivery_status(
    State(state): State<AppState>,
    Path((channel, log_id)): Path<(String, Uuid)>,
    headers: HeaderMap,
    Form(params): Form<BTreeMap<String, String>>,
) -> StatusCode {
    let kind = match channel.as_str() {
        "sms" => NotificationChannelKind::Sms,
        "voice" => NotificationChannelKind::Voice,
        _ => return StatusCode::NOT_FOUND,
    };

    let signature = match headers.get("X-Twilio-Signature").and_then(|v| v.to_str().ok()) {
        Some(sig) => sig,
        None => return StatusCode::UNAUTHORIZED,
    };
    let url = format!("{}/webhooks/twilio/status/{channel}/{log_id}", state.twilio.public_base_url);
    if !verify_twilio_signature(&state.twilio.auth_token, &url, &params, signature) {
        warn!(%channel, %log_id, "rejected twilio delivery-status callback with invalid signature");
        return StatusCode::UNAUTHORIZED;
    }

    let status_field = if kind == NotificationChannelKind::Voice { "CallStatus" } else { "MessageStatus" };
    let Some(raw_status) = params.get(status_field) else { return StatusCode::BAD_REQUEST };
    let Some(target) = terminal_status_for(raw_status) else {
        // queued/sending/ringing/in-progress: nothing terminal to reconcile yet.
        return StatusCode::OK;
    };

    let mut log = match state.notification_logs.find_by_id(log_id).await {
        Ok(Some(log)) => log,
        Ok(None) => return StatusCode::NOT_FOUND,
        Err(err) => {
            warn!(error = %err, %log_id, "failed to load notification log for delivery-status callback");
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
    };

    if !log.status.can_transition_to(target) {
        info!(%log_id, from = %log.status, to = %target, "ignoring delivery-status callback that would regress a terminal log");
        return StatusCode::OK;
    }

    log.status = target;
    if target == NotificationStatus::Delivered {
        log.delivered_at = Some(Utc::now());
    } else {
        log.error = Some(format!("provider reported {raw_status}"));
    }

    match state.notification_logs.update_status(log_id, &log).await {
        Ok(applied) => {
            info!(%log_id, %channel, to = %target, applied, "reconciled delivery-status callback");
            StatusCode::OK
        }
        Err(err) => {
            warn!(error = %err, %log_id, "failed to persist reconciled delivery status");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

#[derive(serde::Deserialize)]
struct SlackInteractionPayload {
    user: SlackUser,
    actions: Option<Vec<SlackAction>>,
}

#[derive(serde::Deserialize)]
struct SlackUser {
    id: String,
}

#[derive(serde::Deserialize)]
struct SlackAction {
    value: Option<String>,
}

pub async fn slack_inbound(State(state): State<AppState>, Path(surface): Path<String>, headers: HeaderMap, body: axum::body::Bytes) -> StatusCode {
    let raw_body = String::from_utf8_lossy(&body).to_string();

    let (Some(signature), Some(timestamp)) = (
        headers.get("X-Slack-Signature").and_then(|v| v.to_str().ok()),
        headers.get("X-Slack-Request-Timestamp").and_then(|v| v.to_str().ok()),
    ) else {
        return StatusCode::UNAUTHORIZED;
    };
    if !verify_slack_signature(&state.slack.signing_secret, timestamp, &raw_body, signature, Utc::now()) {
        warn!(%surface, "rejected slack webhook with invalid signature");
        return StatusCode::UNAUTHORIZED;
    }

    let fields: BTreeMap<String, String> = match serde_urlencoded::from_str(&raw_body) {
        Ok(fields) => fields,
        Err(_) => return StatusCode::BAD_REQUEST,
    };

    let (slack_user_id, text) = match surface.as_str() {
        "interactions" => {
            let Some(payload_json) = fields.get("payload") else { return StatusCode::BAD_REQUEST };
            let Ok(payload) = serde_json::from_str::<SlackInteractionPayload>(payload_json) else { return StatusCode::BAD_REQUEST };
            let action_value = payload.actions.and_then(|a| a.into_iter().next()).and_then(|a| a.value).unwrap_or_default();
            (payload.user.id, action_value)
        }
        "commands" => {
            let Some(user_id) = fields.get("user_id") else { return StatusCode::BAD_REQUEST };
            let text = fields.get("text").cloned().unwrap_or_default();
            let command = fields.get("command").cloned().unwrap_or_default();
            (user_id.clone(), format!("{command} {text}"))
        }
        _ => return StatusCode::NOT_FOUND,
    };

    let Some(action) = parse_action(&text) else { return StatusCode::OK };

    match resolve_target(&state, NotificationChannelKind::Slack, &slack_user_id, &text).await {
        Ok(Some((member_id, incident_id))) => match apply_action(&state, member_id, incident_id, action).await {
            Ok(applied) => {
                info!(%incident_id, %surface, applied, "processed inbound slack reply");
                StatusCode::OK
            }
            Err(err) => {
                warn!(error = %err, %incident_id, "failed to apply inbound slack action");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        },
        Ok(None) => {
            warn!(%surface, "inbound slack reply from unrecognized sender, ignoring");
            StatusCode::OK
        }
        Err(err) => {
            warn!(error = %err, %surface, "failed to resolve inbound slack reply target");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ack_and_resolve_keywords_case_insensitively() {
        assert_eq!(parse_action("ACK 1234"), Some(InboundAction::Acknowledge));
        assert_eq!(parse_action("please Resolve this"), Some(InboundAction::Resolve));
        assert_eq!(parse_action("unrelated text"), None);
    }

    #[test]
    fn extracts_uuid_token_from_free_text() {
        let id = Uuid::new_v4();
        let text = format!("resolve {id} thanks");
        assert_eq!(extract_incident_id(&text), Some(id));
        assert_eq!(extract_incident_id("resolve"), None);
    }

    #[test]
    fn twilio_signature_round_trips() {
        let auth_token = "shh";
        let url = "https://example.com/webhooks/twilio/sms";
        let mut params = BTreeMap::new();
        params.insert("From".to_string(), "+15551234567".to_string());
        params.insert("Body".to_string(), "ack".to_string());

        let mut data = url.to_string();
        for (k, v) in &params {
            data.push_str(k);
            data.push_str(v);
        }
        let mut mac = Hmac::<Sha1>::new_from_slice(auth_token.as_bytes()).unwrap();
        mac.update(data.as_bytes());
        let signature = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());

        assert!(verify_twilio_signature(auth_token, url, &params, &signature));
        assert!(!verify_twilio_signature("wrong-token", url, &params, &signature));
    }

    #[test]
    fn terminal_status_for_maps_twilio_callback_values() {
        assert_eq!(terminal_status_for("delivered"), Some(NotificationStatus::Delivered));
        assert_eq!(terminal_status_for("completed"), Some(NotificationStatus::Delivered));
        assert_eq!(terminal_status_for("failed"), Some(NotificationStatus::Failed));
        assert_eq!(terminal_status_for("undelivered"), Some(NotificationStatus::Failed));
        assert_eq!(terminal_status_for("no-answer"), Some(NotificationStatus::Failed));
        assert_eq!(terminal_status_for("queued"), None);
        assert_eq!(terminal_status_for("ringing"), None);
        assert_eq!(terminal_status_for("in-progress"), None);
    }

    #[test]
    fn slack_signature_rejects_stale_timestamp() {
        let secret = "shh";
        let stale_timestamp = (Utc::now().timestamp() - 10_000).to_string();
        let body = "payload=%7B%7D";
        let base = format!("v0:{stale_timestamp}:{body}");
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(base.as_bytes());
        let signature = format!("v0={}", hex::encode(mac.finalize().into_bytes()));

        assert!(!verify_slack_signature(secret, &stale_timestamp, body, &signature, Utc::now()));
    }
}

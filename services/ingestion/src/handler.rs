//! `POST /webhooks/alerts/{integrationName}`.

use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use std::net::SocketAddr;
use beacon_models::alert::{Alert, WebhookDelivery};
use beacon_queue::{topics, Job};
use beacon_utils::error::{ErrorResponse, FieldError};
use chrono::Utc;
use serde_json::{json, Value};
use tracing::warn;

use crate::adapters::{self, AdapterError};
use crate::fingerprint;
use crate::signature;
use crate::state::{AppState, DedupeJob};

pub async fn ingest_webhook(
    State(state): State<AppState>,
    Path(integration_name): Path<String>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let rate_key = format!("webhook:{}", peer.ip());
    let (admitted, cache_err) = state.rate_limiter().check(&rate_key, state.webhook_rate_limit()).await;
    if let Some(err) = cache_err {
        warn!(error = %err, "rate limit check degraded open");
    }
    if !admitted {
        return (StatusCode::TOO_MANY_REQUESTS, Json(json!({"type": "rate_limited", "message": "webhook rate limit exceeded"}))).into_response();
    }

    let budget = Duration::from_secs(state.config.server.request_timeout_seconds);
    match tokio::time::timeout(budget, handle(state, integration_name, headers, body)).await {
        Ok(response) => response,
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"type": "timeout", "message": "ingest request budget exceeded"}))).into_response(),
    }
}

async fn handle(state: AppState, integration_name: String, headers: HeaderMap, body: Bytes) -> axum::response::Response {
    let started = Instant::now();
    let received_at = Utc::now();

    let integration = match state.integrations.find_by_name(&integration_name).await {
        Ok(Some(integration)) if integration.is_active => integration,
        Ok(_) => {
            record_delivery(&state, None, &integration_name, 404, body.len(), "rejected", received_at).await;
            return (StatusCode::NOT_FOUND, Json(json!({"type": "not_found", "message": "unknown or disabled integration"}))).into_response();
        }
        Err(err) => {
            warn!(error = %err, integration = %integration_name, "integration lookup failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"type": "internal"}))).into_response();
        }
    };

    let signature_valid = headers
        .get(&integration.signature_header)
        .and_then(|value| value.to_str().ok())
        .map(|header_value| signature::verify(integration.signature_algorithm, integration.signature_format, &integration.webhook_secret, &body, header_value))
        .unwrap_or(false);

    if !signature_valid {
        record_delivery(&state, Some(integration.id), &integration_name, 401, body.len(), "rejected", received_at).await;
        return (StatusCode::UNAUTHORIZED, Json(json!({"type": "invalid-signature", "message": "signature verification failed"}))).into_response();
    }

    let payload: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(err) => {
            record_delivery(&state, Some(integration.id), &integration_name, 400, body.len(), "rejected", received_at).await;
            return validation_response(FieldError { field: "body".into(), message: format!("invalid JSON: {err}") });
        }
    };

    let normalized = match adapters::normalize(&integration.provider, &payload) {
        Ok(normalized) => normalized,
        Err(err) => {
            record_delivery(&state, Some(integration.id), &integration_name, 400, body.len(), "rejected", received_at).await;
            return validation_response(field_error_for(err));
        }
    };

    let idempotency_key = headers.get("Idempotency-Key").and_then(|v| v.to_str().ok()).map(str::to_string);

    if let Some(key) = &idempotency_key {
        match state.integrations.find_recent_delivery_by_idempotency_key(integration.id, key).await {
            Ok(Some(alert_id)) => {
                record_delivery(&state, Some(integration.id), &integration_name, 200, body.len(), "duplicate", received_at).await;
                return duplicate_response(&state, alert_id, normalized.severity, normalized.timestamp).await;
            }
            Ok(None) => {}
            Err(err) => warn!(error = %err, "idempotency key lookup failed"),
        }
    } else if let Some(external_id) = &normalized.external_id {
        match state.alerts.find_by_integration_and_external_id(integration.id, external_id).await {
            Ok(Some(existing)) => {
                record_delivery(&state, Some(integration.id), &integration_name, 200, body.len(), "duplicate", received_at).await;
                return duplicate_response(&state, existing.id, existing.severity, existing.received_at).await;
            }
            Ok(None) => {}
            Err(err) => warn!(error = %err, "external id collision lookup failed"),
        }
    }

    let fp = fingerprint::compute(integration.id, &normalized);
    let alert = Alert::new(integration.id, normalized.title, normalized.severity, fp, normalized.metadata, normalized.external_id, normalized.timestamp);

    if let Err(err) = state.alerts.create(&alert).await {
        warn!(error = %err, "alert persistence failed");
        record_delivery(&state, Some(integration.id), &integration_name, 500, body.len(), "rejected", received_at).await;
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"type": "internal"}))).into_response();
    }

    if let Some(key) = &idempotency_key {
        if let Err(err) = state.integrations.record_idempotency_key(integration.id, key, alert.id).await {
            warn!(error = %err, "idempotency key bookkeeping failed");
        }
    }

    record_delivery(&state, Some(integration.id), &integration_name, 201, body.len(), "created", received_at).await;

    if let Err(err) = state.dedupe_queue.enqueue(Job::new(topics::DEDUPE, DedupeJob { alert_id: alert.id }, received_at, 3)).await {
        warn!(error = %err, alert_id = %alert.id, "failed to enqueue dedupe job");
    }

    tracing::debug!(elapsed_ms = started.elapsed().as_millis() as u64, alert_id = %alert.id, "webhook ingested");

    (
        StatusCode::CREATED,
        Json(json!({
            "alert_id": alert.id,
            "severity": alert.severity.as_str(),
            "triggered_at": alert.received_at.to_rfc3339(),
            "status": "created",
        })),
    )
        .into_response()
}

async fn duplicate_response(state: &AppState, alert_id: uuid::Uuid, severity: beacon_models::alert::Severity, triggered_at: chrono::DateTime<Utc>) -> axum::response::Response {
    let _ = state;
    (
        StatusCode::OK,
        Json(json!({
            "alert_id": alert_id,
            "severity": severity.as_str(),
            "triggered_at": triggered_at.to_rfc3339(),
            "status": "duplicate",
            "idempotent": true,
        })),
    )
        .into_response()
}

fn field_error_for(err: AdapterError) -> FieldError {
    match &err {
        AdapterError::MissingField(field) => FieldError { field: field.to_string(), message: err.to_string() },
        AdapterError::UnknownSeverity(raw) => FieldError { field: "severity".into(), message: format!("unrecognized severity '{raw}'") },
        AdapterError::BadTimestamp => FieldError { field: "timestamp".into(), message: err.to_string() },
        AdapterError::UnknownProvider(_) => FieldError { field: "provider".into(), message: err.to_string() },
    }
}

fn validation_response(field_error: FieldError) -> axum::response::Response {
    let response = ErrorResponse {
        error: "validation failed".into(),
        code: "VALIDATION_ERROR".into(),
        message: field_error.message.clone(),
        validation_errors: Some(vec![field_error]),
    };
    (StatusCode::BAD_REQUEST, Json(response)).into_response()
}

async fn record_delivery(state: &AppState, integration_id: Option<uuid::Uuid>, integration_name: &str, status_code: i32, bytes: usize, outcome: &str, received_at: chrono::DateTime<Utc>) {
    let delivery = WebhookDelivery {
        id: uuid::Uuid::new_v4(),
        integration_id,
        integration_name: integration_name.to_string(),
        status_code,
        latency_ms: (Utc::now() - received_at).num_milliseconds().max(0),
        bytes: bytes as i64,
        outcome: outcome.to_string(),
        received_at,
    };
    if let Err(err) = state.deliveries.record(&delivery).await {
        warn!(error = %err, "failed to record webhook delivery");
    }
}

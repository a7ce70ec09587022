//! Provider-specific payload normalization. Each
//! adapter extracts the same normalized shape from a differently-shaped
//! vendor JSON body; the ingestion handler picks the adapter by
//! `Integration.provider` and is otherwise oblivious to vendor format.

use beacon_models::alert::{AlertMetadata, Severity};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedAlert {
    pub title: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    pub external_id: Option<String>,
    pub metadata: AlertMetadata,
}

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("missing required field '{0}'")]
    MissingField(&'static str),
    #[error("unrecognized severity value '{0}'")]
    UnknownSeverity(String),
    #[error("unrecognized timestamp value")]
    BadTimestamp,
    #[error("unknown integration provider '{0}'")]
    UnknownProvider(String),
}

/// Dispatches to the adapter named by `provider` (`Integration.provider`).
/// Providers not on this list fall back to the `generic`
/// adapter rather than failing outright — an operator can always wire a
/// new integration against the generic shape before a dedicated adapter
/// exists.
pub fn normalize(provider: &str, body: &Value) -> Result<NormalizedAlert, AdapterError> {
    match provider {
        "datadog" => datadog(body),
        "prometheus" | "alertmanager" => prometheus(body),
        _ => generic(body),
    }
}

fn field<'a>(body: &'a Value, name: &'static str) -> Result<&'a Value, AdapterError> {
    body.get(name).ok_or(AdapterError::MissingField(name))
}

fn str_field<'a>(body: &'a Value, name: &'static str) -> Result<&'a str, AdapterError> {
    field(body, name)?.as_str().ok_or(AdapterError::MissingField(name))
}

fn extract_extra(body: &Value, known_keys: &[&str]) -> serde_json::Map<String, Value> {
    let mut extra = serde_json::Map::new();
    if let Value::Object(map) = body {
        for (k, v) in map {
            if !known_keys.contains(&k.as_str()) {
                extra.insert(k.clone(), v.clone());
            }
        }
    }
    extra
}

/// Unix-seconds or ISO-8601.
fn parse_timestamp(value: &Value) -> Result<DateTime<Utc>, AdapterError> {
    if let Some(seconds) = value.as_i64() {
        return Utc.timestamp_opt(seconds, 0).single().ok_or(AdapterError::BadTimestamp);
    }
    if let Some(text) = value.as_str() {
        return DateTime::parse_from_rfc3339(text)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| AdapterError::BadTimestamp);
    }
    Err(AdapterError::BadTimestamp)
}

/// Datadog-style: `P1|P2|P3|P4` or free-text `critical|warning|info`
/// severities.
fn normalize_datadog_severity(raw: &str) -> Option<Severity> {
    match raw.to_ascii_uppercase().as_str() {
        "P1" | "CRITICAL" | "EMERGENCY" => Some(Severity::Critical),
        "P2" | "HIGH" | "ERROR" => Some(Severity::High),
        "P3" | "WARNING" | "MEDIUM" => Some(Severity::Medium),
        "P4" | "LOW" => Some(Severity::Low),
        "INFO" | "OK" => Some(Severity::Info),
        _ => None,
    }
}

fn datadog(body: &Value) -> Result<NormalizedAlert, AdapterError> {
    let title = str_field(body, "title")?.to_string();
    let raw_severity = str_field(body, "alert_type").or_else(|_| str_field(body, "severity"))?;
    let severity = normalize_datadog_severity(raw_severity).ok_or_else(|| AdapterError::UnknownSeverity(raw_severity.to_string()))?;
    let timestamp = match body.get("date_happened") {
        Some(v) => parse_timestamp(v)?,
        None => Utc::now(),
    };
    let external_id = body.get("alert_id").and_then(|v| v.as_str().map(str::to_string).or_else(|| v.as_i64().map(|n| n.to_string())));
    let routing_key = body.get("routing_key").and_then(Value::as_str).map(str::to_string);
    let service_name = body.get("service").and_then(Value::as_str).map(str::to_string);

    Ok(NormalizedAlert {
        title,
        severity,
        timestamp,
        external_id,
        metadata: AlertMetadata {
            routing_key,
            service_name,
            extra: extract_extra(body, &["title", "alert_type", "severity", "date_happened", "alert_id", "routing_key", "service"]),
        },
    })
}

/// Prometheus Alertmanager webhook: a group of `alerts[]`, firing/resolved
/// status, `labels`/`annotations` maps. Only the first alert of the batch
/// is normalized; callers that need per-alert fan-out split the batch
/// upstream.
fn prometheus(body: &Value) -> Result<NormalizedAlert, AdapterError> {
    let alerts = field(body, "alerts")?.as_array().ok_or(AdapterError::MissingField("alerts"))?;
    let first = alerts.first().ok_or(AdapterError::MissingField("alerts"))?;
    let labels = first.get("labels").cloned().unwrap_or(Value::Object(Default::default()));
    let annotations = first.get("annotations").cloned().unwrap_or(Value::Object(Default::default()));

    let title = annotations
        .get("summary")
        .and_then(Value::as_str)
        .or_else(|| labels.get("alertname").and_then(Value::as_str))
        .ok_or(AdapterError::MissingField("labels.alertname"))?
        .to_string();

    let raw_severity = labels.get("severity").and_then(Value::as_str).unwrap_or("warning");
    let severity = normalize_datadog_severity(raw_severity).ok_or_else(|| AdapterError::UnknownSeverity(raw_severity.to_string()))?;

    let timestamp = match first.get("startsAt").and_then(Value::as_str) {
        Some(text) => DateTime::parse_from_rfc3339(text).map(|dt| dt.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now()),
        None => Utc::now(),
    };

    let fingerprint_field = first.get("fingerprint").and_then(Value::as_str).map(str::to_string);
    let service_name = labels.get("service").and_then(Value::as_str).map(str::to_string);

    Ok(NormalizedAlert {
        title,
        severity,
        timestamp,
        external_id: fingerprint_field,
        metadata: AlertMetadata { routing_key: None, service_name, extra: extract_extra(&labels, &["alertname", "severity", "service"]) },
    })
}

/// Fallback shape for integrations without a dedicated adapter: a flat
/// object carrying `title`/`severity`/`timestamp` directly.
fn generic(body: &Value) -> Result<NormalizedAlert, AdapterError> {
    let title = str_field(body, "title")?.to_string();
    let raw_severity = str_field(body, "severity")?;
    let severity = Severity::parse(raw_severity)
        .or_else(|| normalize_datadog_severity(raw_severity))
        .ok_or_else(|| AdapterError::UnknownSeverity(raw_severity.to_string()))?;
    let timestamp = match body.get("timestamp") {
        Some(v) => parse_timestamp(v)?,
        None => Utc::now(),
    };
    let external_id = body.get("external_id").and_then(Value::as_str).map(str::to_string);
    let routing_key = body.get("routing_key").and_then(Value::as_str).map(str::to_string);
    let service_name = body.get("service").or_else(|| body.get("service_name")).and_then(Value::as_str).map(str::to_string);

    Ok(NormalizedAlert {
        title,
        severity,
        timestamp,
        external_id,
        metadata: AlertMetadata {
            routing_key,
            service_name,
            extra: extract_extra(body, &["title", "severity", "timestamp", "external_id", "routing_key", "service", "service_name"]),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn datadog_p1_normalizes_to_critical() {
        let body = json!({"title": "db down", "alert_type": "P1", "alert_id": 42, "date_happened": 1_700_000_000});
        let alert = normalize("datadog", &body).unwrap();
        assert_eq!(alert.severity, Severity::Critical);
        assert_eq!(alert.external_id.as_deref(), Some("42"));
    }

    #[test]
    fn datadog_warning_normalizes_to_medium() {
        let body = json!({"title": "disk 80%", "alert_type": "warning"});
        assert_eq!(normalize("datadog", &body).unwrap().severity, Severity::Medium);
    }

    #[test]
    fn datadog_info_normalizes_to_info() {
        let body = json!({"title": "deploy finished", "alert_type": "info"});
        assert_eq!(normalize("datadog", &body).unwrap().severity, Severity::Info);
    }

    #[test]
    fn prometheus_batch_uses_first_alert_and_label_severity() {
        let body = json!({
            "alerts": [
                {"labels": {"alertname": "HighCPU", "severity": "critical", "service": "checkout"}, "annotations": {"summary": "CPU hot"}, "startsAt": "2026-01-01T00:00:00Z", "fingerprint": "abc123"}
            ]
        });
        let alert = normalize("prometheus", &body).unwrap();
        assert_eq!(alert.title, "CPU hot");
        assert_eq!(alert.severity, Severity::Critical);
        assert_eq!(alert.metadata.service_name.as_deref(), Some("checkout"));
        assert_eq!(alert.external_id.as_deref(), Some("abc123"));
    }

    #[test]
    fn generic_adapter_reads_flat_shape() {
        let body = json!({"title": "boom", "severity": "HIGH", "routing_key": "svc-key"});
        let alert = normalize("anything-else", &body).unwrap();
        assert_eq!(alert.severity, Severity::High);
        assert_eq!(alert.metadata.routing_key.as_deref(), Some("svc-key"));
    }

    #[test]
    fn missing_title_is_rejected() {
        let body = json!({"severity": "HIGH"});
        assert!(matches!(normalize("anything-else", &body), Err(AdapterError::MissingField("title"))));
    }

    #[test]
    fn unknown_severity_is_rejected() {
        let body = json!({"title": "boom", "severity": "nonsense"});
        assert!(matches!(normalize("anything-else", &body), Err(AdapterError::UnknownSeverity(_))));
    }
}

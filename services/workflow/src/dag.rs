//! Dotted-path field lookup shared by the matcher's trigger conditions
//! and the executor's condition nodes ("conditions ... via
//! dotted path").

use beacon_models::incident::Incident;
use serde_json::{json, Value};

/// Renders an incident the way the rest of the fleet renders it over the
/// wire - `severity`/`status` as their canonical uppercase strings via
/// `as_str()`/`Display`, not serde's derived variant-name spelling - so a
/// condition value of `"HIGH"` or `"RESOLVED"` matches what an operator
/// actually sees elsewhere in the API.
pub fn incident_to_json(incident: &Incident) -> Value {
    json!({
        "id": incident.id,
        "service_id": incident.service_id,
        "title": incident.title,
        "severity": incident.severity.as_str(),
        "status": incident.status.to_string(),
        "fingerprint": incident.fingerprint,
        "alert_count": incident.alert_count,
        "escalation_policy_id": incident.escalation_policy_id,
        "current_escalation_level": incident.current_escalation_level,
        "current_repeat": incident.current_repeat,
        "acknowledged_by": incident.acknowledged_by,
        "acknowledged_at": incident.acknowledged_at,
        "resolved_by": incident.resolved_by,
        "resolved_at": incident.resolved_at,
    })
}

/// Resolves `path` (e.g. `"incident.severity"`) against `context`,
/// walking one object key per segment. A missing segment or a path that
/// runs into a non-object yields `None` rather than an error — absent
/// fields simply fail to match rather than erroring.
pub fn resolve_path<'a>(context: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = context;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// `{field, op, value}` equality check ("op=equals"). Both
/// sides are compared as their canonical string representation so a
/// condition value of `"HIGH"` matches a stored `Severity::High` however
/// serde renders it, without the matcher needing to know each field's
/// concrete Rust type.
pub fn equals(context: &Value, field: &str, expected: &Value) -> bool {
    match resolve_path(context, field) {
        Some(actual) => value_as_str(actual) == value_as_str(expected),
        None => false,
    }
}

fn value_as_str(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolves_nested_dotted_path() {
        let context = json!({"incident": {"severity": "HIGH"}});
        assert_eq!(resolve_path(&context, "incident.severity"), Some(&json!("HIGH")));
    }

    #[test]
    fn missing_segment_resolves_to_none() {
        let context = json!({"incident": {"severity": "HIGH"}});
        assert_eq!(resolve_path(&context, "incident.missing"), None);
        assert_eq!(resolve_path(&context, "nope.severity"), None);
    }

    #[test]
    fn equals_compares_string_and_non_string_json_by_text() {
        let context = json!({"incident": {"severity": "HIGH", "alert_count": 3}});
        assert!(equals(&context, "incident.severity", &json!("HIGH")));
        assert!(!equals(&context, "incident.severity", &json!("LOW")));
        assert!(equals(&context, "incident.alert_count", &json!(3)));
    }

    #[test]
    fn incident_to_json_renders_canonical_uppercase_enum_strings() {
        use beacon_models::incident::{Incident, IncidentStatus};
        use beacon_models::alert::Severity;
        use chrono::Utc;
        use uuid::Uuid;

        let incident = Incident {
            id: Uuid::new_v4(),
            service_id: Uuid::new_v4(),
            title: "db down".into(),
            severity: Severity::High,
            status: IncidentStatus::Triggered,
            fingerprint: "fp".into(),
            alert_count: 1,
            escalation_policy_id: Uuid::new_v4(),
            current_escalation_level: 1,
            current_repeat: 1,
            acknowledged_by: None,
            acknowledged_at: None,
            resolved_by: None,
            resolved_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let rendered = incident_to_json(&incident);
        assert_eq!(rendered["severity"], "HIGH");
        assert_eq!(rendered["status"], "TRIGGERED");
    }
}

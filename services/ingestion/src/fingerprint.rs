//! Deterministic alert identity`). Two deliveries that
//! describe "the same problem" must hash identically regardless of
//! delivery timestamp, so only the normalized key fields — not
//! `receivedAt` — feed the hash.

use crate::adapters::NormalizedAlert;
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub fn compute(integration_id: Uuid, alert: &NormalizedAlert) -> String {
    let mut hasher = Sha256::new();
    hasher.update(integration_id.as_bytes());
    hasher.update(b"\0");
    hasher.update(alert.title.as_bytes());
    hasher.update(b"\0");
    hasher.update(alert.severity.as_str().as_bytes());
    hasher.update(b"\0");
    hasher.update(alert.metadata.routing_key.as_deref().unwrap_or("").as_bytes());
    hasher.update(b"\0");
    hasher.update(alert.metadata.service_name.as_deref().unwrap_or("").as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_models::alert::{AlertMetadata, Severity};
    use chrono::Utc;

    fn alert(title: &str, routing_key: Option<&str>) -> NormalizedAlert {
        NormalizedAlert {
            title: title.to_string(),
            severity: Severity::Critical,
            timestamp: Utc::now(),
            external_id: None,
            metadata: AlertMetadata { routing_key: routing_key.map(str::to_string), service_name: None, extra: Default::default() },
        }
    }

    #[test]
    fn identical_key_fields_produce_identical_fingerprints_regardless_of_timestamp() {
        let integration_id = Uuid::new_v4();
        let a = alert("db down", Some("svc-1"));
        let mut b = alert("db down", Some("svc-1"));
        b.timestamp = a.timestamp + chrono::Duration::hours(3);
        assert_eq!(compute(integration_id, &a), compute(integration_id, &b));
    }

    #[test]
    fn different_titles_produce_different_fingerprints() {
        let integration_id = Uuid::new_v4();
        let a = alert("db down", Some("svc-1"));
        let b = alert("cache down", Some("svc-1"));
        assert_ne!(compute(integration_id, &a), compute(integration_id, &b));
    }

    #[test]
    fn different_integrations_never_collide() {
        let alert = alert("db down", Some("svc-1"));
        assert_ne!(compute(Uuid::new_v4(), &alert), compute(Uuid::new_v4(), &alert));
    }
}

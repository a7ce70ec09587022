//! Property-based tests for core domain models: serialization round-trip
//! consistency and enum-string canonicalization hold for arbitrary valid
//! instances, not just the handful of fixtures the in-file unit tests use.

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use uuid::Uuid;

use crate::alert::Severity;
use crate::incident::{Incident, IncidentStatus};
use crate::notification::{NotificationStatus, NotificationTier};

prop_compose! {
    fn arb_datetime()(timestamp in 0i64..2_147_483_647i64) -> DateTime<Utc> {
        Utc.timestamp_opt(timestamp, 0).unwrap()
    }
}

prop_compose! {
    fn arb_uuid()(bytes in prop::array::uniform16(0u8..)) -> Uuid {
        Uuid::from_bytes(bytes)
    }
}

fn arb_severity() -> impl Strategy<Value = Severity> {
    prop_oneof![
        Just(Severity::Info),
        Just(Severity::Low),
        Just(Severity::Medium),
        Just(Severity::High),
        Just(Severity::Critical),
    ]
}

fn arb_incident_status() -> impl Strategy<Value = IncidentStatus> {
    prop_oneof![
        Just(IncidentStatus::Triggered),
        Just(IncidentStatus::Acknowledged),
        Just(IncidentStatus::Resolved),
        Just(IncidentStatus::Closed),
    ]
}

prop_compose! {
    fn arb_incident()(
        id in arb_uuid(),
        service_id in arb_uuid(),
        title in "[A-Za-z0-9 ]{5,80}",
        severity in arb_severity(),
        status in arb_incident_status(),
        fingerprint in "[a-f0-9]{16,64}",
        alert_count in 1..1000i32,
        escalation_policy_id in arb_uuid(),
        current_escalation_level in 1..10i32,
        current_repeat in 1..10i32,
        created_at in arb_datetime(),
        updated_at in arb_datetime(),
    ) -> Incident {
        Incident {
            id,
            service_id,
            title,
            severity,
            status,
            fingerprint,
            alert_count,
            escalation_policy_id,
            current_escalation_level,
            current_repeat,
            acknowledged_by: None,
            acknowledged_at: None,
            resolved_by: None,
            resolved_at: None,
            created_at,
            updated_at,
        }
    }
}

proptest! {
    /// Serializing an incident to JSON and back never loses or mutates a
    /// field — required for workflow condition matching, which reads
    /// incidents back out of their JSON rendering.
    #[test]
    fn incident_round_trips_through_json(incident in arb_incident()) {
        let json = serde_json::to_string(&incident).expect("serialize incident");
        let deserialized: Incident = serde_json::from_str(&json).expect("deserialize incident");
        prop_assert_eq!(incident.id, deserialized.id);
        prop_assert_eq!(incident.service_id, deserialized.service_id);
        prop_assert_eq!(&incident.title, &deserialized.title);
        prop_assert_eq!(incident.severity, deserialized.severity);
        prop_assert_eq!(incident.status, deserialized.status);
        prop_assert_eq!(&incident.fingerprint, &deserialized.fingerprint);
        prop_assert_eq!(incident.alert_count, deserialized.alert_count);
        prop_assert_eq!(incident.current_escalation_level, deserialized.current_escalation_level);
        prop_assert_eq!(incident.current_repeat, deserialized.current_repeat);
    }

    /// `Severity::parse` is the left inverse of `as_str` for every variant,
    /// regardless of input casing — the ingestion adapters rely on this to
    /// normalize severities from arbitrarily-cased upstream payloads.
    #[test]
    fn severity_round_trips_through_as_str_case_insensitively(severity in arb_severity()) {
        let upper = severity.as_str();
        let lower = upper.to_lowercase();
        prop_assert_eq!(Severity::parse(upper), Some(severity));
        prop_assert_eq!(Severity::parse(&lower), Some(severity));
    }

    /// `NotificationTier::next()` only ever advances Primary -> Secondary
    /// -> Tertiary -> None, never back to a tier already tried — fan-out
    /// escalation never revisits a tier.
    #[test]
    fn notification_tier_next_only_advances(tier in prop_oneof![
        Just(NotificationTier::Primary),
        Just(NotificationTier::Secondary),
        Just(NotificationTier::Tertiary),
    ]) {
        let rank = |t: NotificationTier| match t {
            NotificationTier::Primary => 0,
            NotificationTier::Secondary => 1,
            NotificationTier::Tertiary => 2,
        };
        match tier.next() {
            Some(next) => prop_assert_eq!(rank(next), rank(tier) + 1),
            None => prop_assert_eq!(tier, NotificationTier::Tertiary),
        }
    }

    /// Every tier's canonical string round-trips through `parse`, so the
    /// Postgres string-backed enum never silently coerces an unrecognized
    /// value.
    #[test]
    fn notification_tier_round_trips_through_display_and_parse(tier in prop_oneof![
        Just(NotificationTier::Primary),
        Just(NotificationTier::Secondary),
        Just(NotificationTier::Tertiary),
    ]) {
        prop_assert_eq!(NotificationTier::parse(&tier.to_string()), Some(tier));
    }

    /// Same round-trip guarantee for notification status, the field the
    /// tier-escalation threshold (`failed_channel_count`) filters on.
    #[test]
    fn notification_status_round_trips_through_display_and_parse(status in prop_oneof![
        Just(NotificationStatus::Pending),
        Just(NotificationStatus::Sent),
        Just(NotificationStatus::Delivered),
        Just(NotificationStatus::Failed),
    ]) {
        prop_assert_eq!(NotificationStatus::parse(&status.to_string()), Some(status));
    }

    /// Monotone log status: for any pair of distinct states, a transition
    /// is legal in at most one direction, and neither `DELIVERED` nor
    /// `FAILED` ever accepts a further transition - a late-arriving
    /// reconciliation webhook naming either as the destination for a log
    /// already in that terminal state can never regress it.
    #[test]
    fn notification_status_transitions_never_regress_from_a_terminal_state(
        from in prop_oneof![
            Just(NotificationStatus::Pending),
            Just(NotificationStatus::Sent),
            Just(NotificationStatus::Delivered),
            Just(NotificationStatus::Failed),
        ],
        to in prop_oneof![
            Just(NotificationStatus::Pending),
            Just(NotificationStatus::Sent),
            Just(NotificationStatus::Delivered),
            Just(NotificationStatus::Failed),
        ],
    ) {
        if from.is_terminal() {
            prop_assert!(!from.can_transition_to(to), "{from} is terminal and must reject every transition, including to {to}");
        }
        if from.can_transition_to(to) {
            prop_assert!(!to.can_transition_to(from), "transition {from} -> {to} being legal must make the reverse illegal");
        }
    }
}

//! On-call resolution: overrides, layered rotations, and the base
//! schedule fallback, all evaluated in the schedule's declared timezone
//! so recurrence math survives DST transitions.

use std::str::FromStr;

use anyhow::{Context, Result};
use beacon_models::schedule::ScheduleLayer;
use beacon_store::{ScheduleLayerRepository, ScheduleOverrideRepository, ScheduleRepository};
use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;
use cron::Schedule as CronSchedule;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnCallSource {
    Override,
    Layer,
    Base,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OnCallResult {
    pub user_id: Uuid,
    pub source: OnCallSource,
}

/// Upper bound on how many cron occurrences we'll walk looking for the
/// shift active at `at`. A misconfigured sub-minute rotation expression
/// should fail loudly rather than spin; no real rotation needs anywhere
/// near this many handoffs between `rotation_start` and `at`.
const MAX_OCCURRENCES: usize = 100_000;

/// How many handoffs of `cron_expr` (evaluated in `tz`) have occurred in
/// `(start, at]`. `start` itself seeds shift 0 (the first participant),
/// so a count of zero means no handoff has happened yet and the rotation
/// is still on its first shift. `None` means `at` precedes `start`
/// entirely, i.e. the rotation has not started.
fn shift_count(cron_expr: &str, tz: Tz, start: DateTime<Utc>, at: DateTime<Utc>) -> Result<Option<usize>> {
    if at < start {
        return Ok(None);
    }
    let schedule = CronSchedule::from_str(cron_expr).context("parse rotation cron expression")?;
    let start_local = start.with_timezone(&tz);
    let at_local = at.with_timezone(&tz);

    let mut count = 0usize;
    for (index, occurrence) in schedule.after(&start_local).enumerate() {
        if index >= MAX_OCCURRENCES || occurrence > at_local {
            break;
        }
        count = index + 1;
    }
    Ok(Some(count))
}

/// Restriction minutes are minute-of-day bounds in the rotation's
/// timezone (e.g. business-hours-only layers); `None` means unrestricted.
/// A wrapping window (`start > end`) covers midnight, e.g. a night-shift
/// layer running 22:00-06:00.
fn within_restriction(layer: &ScheduleLayer, at_local: DateTime<Tz>) -> bool {
    match (layer.restriction_start_minute, layer.restriction_end_minute) {
        (Some(start), Some(end)) => {
            let minute_of_day = at_local.hour() as i32 * 60 + at_local.minute() as i32;
            if start <= end {
                minute_of_day >= start && minute_of_day < end
            } else {
                minute_of_day >= start || minute_of_day < end
            }
        }
        _ => true,
    }
}

fn resolve_layer(layer: &ScheduleLayer, tz: Tz, at: DateTime<Utc>) -> Result<Option<Uuid>> {
    if layer.participants.is_empty() {
        return Ok(None);
    }
    if !within_restriction(layer, at.with_timezone(&tz)) {
        return Ok(None);
    }
    let Some(count) = shift_count(&layer.rotation_cron, tz, layer.rotation_start, at)? else {
        return Ok(None);
    };
    let shift_index = count % layer.participants.len();
    Ok(Some(layer.participants[shift_index]))
}

/// Computes who is on call for a schedule at an instant. Decision order: override, then layers highest
/// `layer_index` first, then the base schedule if it has no layers.
pub struct OnCallResolver {
    schedules: ScheduleRepository,
    layers: ScheduleLayerRepository,
    overrides: ScheduleOverrideRepository,
}

impl OnCallResolver {
    pub fn new(
        schedules: ScheduleRepository,
        layers: ScheduleLayerRepository,
        overrides: ScheduleOverrideRepository,
    ) -> Self {
        Self { schedules, layers, overrides }
    }

    pub async fn current_on_call(&self, schedule_id: Uuid, at: DateTime<Utc>) -> Result<Option<OnCallResult>> {
        let covering = self.overrides.find_covering(schedule_id, at).await?;
        if let Some(over) = covering.into_iter().next() {
            return Ok(Some(OnCallResult { user_id: over.user_id, source: OnCallSource::Override }));
        }

        let Some(schedule) = self.schedules.find_by_id(schedule_id).await? else {
            return Ok(None);
        };
        let tz: Tz = schedule
            .timezone
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid IANA timezone '{}'", schedule.timezone))?;

        let mut layers = self.layers.find_for_schedule(schedule_id).await?;
        layers.sort_by_key(|l| std::cmp::Reverse(l.layer_index));
        for layer in &layers {
            if let Some(user_id) = resolve_layer(layer, tz, at)? {
                return Ok(Some(OnCallResult { user_id, source: OnCallSource::Layer }));
            }
        }

        if layers.is_empty() && schedule.is_active && !schedule.rotation_user_ids.is_empty() {
            if let Some(count) = shift_count(&schedule.rotation_cron, tz, schedule.rotation_start, at)? {
                let shift_index = count % schedule.rotation_user_ids.len();
                return Ok(Some(OnCallResult {
                    user_id: schedule.rotation_user_ids[shift_index],
                    source: OnCallSource::Base,
                }));
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_models::schedule::ScheduleLayer;

    fn layer(rotation_cron: &str, start: DateTime<Utc>, participants: Vec<Uuid>) -> ScheduleLayer {
        ScheduleLayer {
            id: Uuid::new_v4(),
            schedule_id: Uuid::new_v4(),
            layer_index: 0,
            rotation_cron: rotation_cron.into(),
            rotation_start: start,
            participants,
            restriction_start_minute: None,
            restriction_end_minute: None,
        }
    }

    #[test]
    fn rotation_picks_participant_by_occurrence_count() {
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let start = DateTime::parse_from_rfc3339("2026-01-05T00:00:00Z").unwrap().with_timezone(&Utc);
        // weekly handoff every Monday at 00:00
        let layer = layer("0 0 0 * * MON", start, vec![alice, bob]);

        // before any handoff, the rotation is still on its first shift
        let at = start + chrono::Duration::days(3);
        let tz: Tz = "UTC".parse().unwrap();
        let result = resolve_layer(&layer, tz, at).unwrap();
        assert_eq!(result, Some(alice));

        let at_second_week = start + chrono::Duration::days(10);
        let result = resolve_layer(&layer, tz, at_second_week).unwrap();
        assert_eq!(result, Some(bob));
    }

    #[test]
    fn restriction_window_excludes_layer_outside_hours() {
        let alice = Uuid::new_v4();
        let start = DateTime::parse_from_rfc3339("2026-01-05T00:00:00Z").unwrap().with_timezone(&Utc);
        let mut layer = layer("0 0 0 * * MON", start, vec![alice]);
        layer.restriction_start_minute = Some(9 * 60);
        layer.restriction_end_minute = Some(17 * 60);

        let tz: Tz = "UTC".parse().unwrap();
        let during_hours = start + chrono::Duration::hours(10);
        let outside_hours = start + chrono::Duration::hours(20);
        assert_eq!(resolve_layer(&layer, tz, during_hours).unwrap(), Some(alice));
        assert_eq!(resolve_layer(&layer, tz, outside_hours).unwrap(), None);
    }

    #[test]
    fn dst_spring_forward_does_not_panic_or_skip_a_handoff() {
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        // US DST spring-forward 2026-03-08 02:00 -> 03:00 America/New_York
        let start = DateTime::parse_from_rfc3339("2026-03-01T00:00:00-05:00").unwrap().with_timezone(&Utc);
        let layer = layer("0 0 0 * * MON", start, vec![alice, bob]);
        let tz: Tz = "America/New_York".parse().unwrap();
        let after_transition = start + chrono::Duration::days(10);
        let result = resolve_layer(&layer, tz, after_transition).unwrap();
        assert!(result.is_some());
    }
}

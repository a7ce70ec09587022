//! On-call schedule models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, Validate)]
pub struct Schedule {
    pub id: Uuid,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub team_id: Uuid,
    /// IANA zone name the rotation's cron expressions are evaluated in.
    pub timezone: String,
    /// Base rotation, used only when the schedule has no layers").
    pub rotation_cron: String,
    pub rotation_start: DateTime<Utc>,
    pub rotation_user_ids: Vec<Uuid>,
    pub is_active: bool,
}

/// One rotation within a schedule. `rotation` is a `cron` expression
/// (the same `cron` crate used elsewhere in this workspace) describing
/// handoff instants; `participants` rotate in order at each handoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ScheduleLayer {
    pub id: Uuid,
    pub schedule_id: Uuid,
    /// Higher wins when more than one layer applies at the same instant.
    pub layer_index: i32,
    pub rotation_cron: String,
    /// Anchor the rotation's cron enumeration starts from.
    pub rotation_start: DateTime<Utc>,
    pub participants: Vec<Uuid>,
    pub restriction_start_minute: Option<i32>,
    pub restriction_end_minute: Option<i32>,
}

/// A manual, time-bounded override of whoever a layer would otherwise
/// select — always wins over the base rotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ScheduleOverride {
    pub id: Uuid,
    pub schedule_id: Uuid,
    pub user_id: Uuid,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ScheduleOverride {
    pub fn covers(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at < self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_covers_is_half_open() {
        let start = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc);
        let end = start + chrono::Duration::hours(1);
        let over = ScheduleOverride { id: Uuid::new_v4(), schedule_id: Uuid::new_v4(), user_id: Uuid::new_v4(), start, end };
        assert!(over.covers(start));
        assert!(!over.covers(end));
    }
}

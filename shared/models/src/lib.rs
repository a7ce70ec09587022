//! Domain models for the incident-management control plane.
//!
//! Each module corresponds to one aggregate from the data model: alerts,
//! incidents, services/integrations, teams/members, escalation policies,
//! on-call schedules, workflows, and notification logs. All entities
//! implement serde (for API/JSON boundaries) and `sqlx::FromRow` (for the
//! Postgres store); request-shaped structs additionally derive `Validate`.

#[macro_use]
pub mod pg_enum;

pub mod alert;
pub mod escalation_policy;
pub mod incident;
pub mod lifecycle;
pub mod notification;
pub mod schedule;
pub mod service;
pub mod team;
pub mod workflow;

#[cfg(test)]
mod property_tests;

pub use alert::*;
pub use escalation_policy::*;
pub use incident::*;
pub use lifecycle::*;
pub use notification::*;
pub use schedule::*;
pub use service::*;
pub use team::*;
pub use workflow::*;

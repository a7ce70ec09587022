//! Typed repository implementations for all domain entities.

pub mod alert;
pub mod escalation;
pub mod incident;
pub mod notification;
pub mod schedule;
pub mod service;
pub mod team;
pub mod workflow;

pub use alert::{AlertRepository, WebhookDeliveryRepository};
pub use escalation::{EscalationLevelRepository, EscalationPolicyRepository};
pub use incident::{IncidentStore, InMemoryIncidentStore, PostgresIncidentStore};
pub use notification::{InMemoryNotificationLogStore, NotificationLogStore, PostgresNotificationLogStore};
pub use schedule::{ScheduleLayerRepository, ScheduleOverrideRepository, ScheduleRepository};
pub use service::{IntegrationRepository, ServiceRepository};
pub use team::{TeamMemberRepository, TeamRepository};
pub use workflow::{WorkflowExecutionRepository, WorkflowRepository, WorkflowVersionRepository};

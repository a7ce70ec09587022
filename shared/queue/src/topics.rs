//! Named queues shared by the service fleet. Centralized here so no two
//! services drift on a topic string.

/// Deduplicator input: one job per freshly ingested alert.
pub const DEDUPE: &str = "dedupe";

/// Escalation engine timeout jobs, scheduled at absolute deadlines.
pub const ESCALATION_TIMEOUT: &str = "escalation_timeout";

/// Lifecycle events fanned out to the escalation engine and the workflow
/// matcher.
/// Consumers `pop_due` with `due_at = now`, using the delayed-job queue as
/// a plain at-least-once event bus.
pub const LIFECYCLE_EVENTS: &str = "lifecycle_events";

/// Per-channel notification dispatch jobs.
pub const NOTIFICATION_DISPATCH: &str = "notification_dispatch";

/// Workflow executor jobs, one per matched workflow.
pub const WORKFLOW_EXECUTION: &str = "workflow_execution";

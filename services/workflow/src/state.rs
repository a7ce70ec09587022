//! Shared handles the matcher, executor, and manual-trigger API all need.

use std::sync::Arc;

use beacon_cache::SlidingWindowRateLimiter;
use beacon_models::lifecycle::LifecycleEvent;
use beacon_queue::{NotificationDispatchJob, SharedJobQueue, WorkflowExecutionJob};
use beacon_store::{
    EscalationPolicyRepository, IncidentStore, ServiceRepository, TeamMemberRepository, TeamRepository, WorkflowExecutionRepository,
    WorkflowRepository, WorkflowVersionRepository,
};
use tokio::sync::Semaphore;

#[derive(Clone)]
pub struct AppState {
    pub workflows: Arc<WorkflowRepository>,
    pub versions: Arc<WorkflowVersionRepository>,
    pub executions: Arc<WorkflowExecutionRepository>,
    pub incidents: Arc<dyn IncidentStore>,
    pub services: Arc<ServiceRepository>,
    pub escalation_policies: Arc<EscalationPolicyRepository>,
    pub teams: Arc<TeamRepository>,
    pub team_members: Arc<TeamMemberRepository>,
    pub lifecycle_queue: SharedJobQueue<LifecycleEvent>,
    pub execution_queue: SharedJobQueue<WorkflowExecutionJob>,
    pub notification_queue: SharedJobQueue<NotificationDispatchJob>,
    pub rate_limiter: Arc<SlidingWindowRateLimiter>,
    /// Caps concurrent executions at 5.
    pub concurrency: Arc<Semaphore>,
    pub http: reqwest::Client,
}

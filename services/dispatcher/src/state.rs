//! Shared handles the dispatch worker and the inbound webhook handlers
//! both need.

use std::sync::Arc;

use beacon_models::lifecycle::LifecycleEvent;
use beacon_providers::ProviderRegistry;
use beacon_queue::{NotificationDispatchJob, SharedJobQueue};
use beacon_store::{IncidentStore, NotificationLogStore, TeamMemberRepository};
use beacon_utils::{SlackConfig, TwilioConfig};

#[derive(Clone)]
pub struct AppState {
    pub incidents: Arc<dyn IncidentStore>,
    pub team_members: Arc<TeamMemberRepository>,
    pub notification_logs: Arc<dyn NotificationLogStore>,
    pub registry: Arc<ProviderRegistry>,
    pub notification_queue: SharedJobQueue<NotificationDispatchJob>,
    pub lifecycle_queue: SharedJobQueue<LifecycleEvent>,
    pub twilio: TwilioConfig,
    pub slack: SlackConfig,
}

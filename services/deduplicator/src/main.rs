//! Beacon Deduplicator Service: the standalone worker binary that drains
//! the `dedupe` queue.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use beacon_deduplicator::AppState;
use beacon_queue::RedisJobQueue;
use beacon_routing::{OnCallResolver, Router};
use beacon_store::{
    create_postgres_pool, AlertRepository, EscalationLevelRepository, EscalationPolicyRepository, IntegrationRepository,
    PostgresIncidentStore, ScheduleLayerRepository, ScheduleOverrideRepository, ScheduleRepository, ServiceRepository,
    TeamMemberRepository, TeamRepository,
};
use beacon_utils::{init_logging, AppConfig};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load().unwrap_or_else(|_| {
        eprintln!("failed to load configuration, using defaults");
        AppConfig::default()
    });
    init_logging(&config.logging)?;
    info!("starting beacon deduplicator service");

    let pool = create_postgres_pool(&config.database.postgres_url, config.database.max_connections).await?;
    beacon_store::migrations::run_postgres_migrations(&pool).await?;

    let on_call = OnCallResolver::new(
        ScheduleRepository::new(pool.clone()),
        ScheduleLayerRepository::new(pool.clone()),
        ScheduleOverrideRepository::new(pool.clone()),
    );
    let router = Arc::new(Router::new(
        ServiceRepository::new(pool.clone()),
        TeamRepository::new(pool.clone()),
        EscalationPolicyRepository::new(pool.clone()),
        EscalationLevelRepository::new(pool.clone()),
        TeamMemberRepository::new(pool.clone()),
        on_call,
    ));

    let state = AppState {
        alerts: Arc::new(AlertRepository::new(pool.clone())),
        integrations: Arc::new(IntegrationRepository::new(pool.clone())),
        incidents: Arc::new(PostgresIncidentStore::new(pool.clone())),
        router,
        dedupe_queue: Arc::new(RedisJobQueue::new(&config.database.redis_url, "beacon:")?),
        lifecycle_queue: Arc::new(RedisJobQueue::new(&config.database.redis_url, "beacon:")?),
    };

    beacon_deduplicator::run_worker(state, Duration::from_millis(500)).await;
}

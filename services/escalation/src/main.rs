//! Beacon Escalation Service: runs the per-incident escalation FSM
//! as two concurrent pollers sharing one state.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use beacon_escalation::{run_lifecycle_worker, run_timeout_worker, AppState};
use beacon_queue::RedisJobQueue;
use beacon_routing::{OnCallResolver, Router};
use beacon_store::{
    create_postgres_pool, EscalationLevelRepository, EscalationPolicyRepository, PostgresIncidentStore, ScheduleLayerRepository,
    ScheduleOverrideRepository, ScheduleRepository, ServiceRepository, TeamMemberRepository, TeamRepository,
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
    info!("starting beacon escalation service");

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
        incidents: Arc::new(PostgresIncidentStore::new(pool.clone())),
        router,
        lifecycle_queue: Arc::new(RedisJobQueue::new(&config.database.redis_url, "beacon:")?),
        timeout_queue: Arc::new(RedisJobQueue::new(&config.database.redis_url, "beacon:")?),
        notification_queue: Arc::new(RedisJobQueue::new(&config.database.redis_url, "beacon:")?),
    };

    let lifecycle_state = state.clone();
    let timeout_state = state.clone();
    tokio::select! {
        _ = run_lifecycle_worker(lifecycle_state, Duration::from_millis(500)) => {},
        _ = run_timeout_worker(timeout_state, Duration::from_millis(500)) => {},
    }

    Ok(())
}

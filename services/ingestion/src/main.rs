//! Beacon Ingestion Service. Terminates provider webhooks, verifies the
//! signature, normalizes the payload, and hands off to the deduplicator
//! via the `dedupe` queue.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::DefaultBodyLimit;
use axum::http::{header, Method};
use axum::routing::{get, post};
use axum::{serve, Json, Router as AxumRouter};
use beacon_cache::{CacheConfig, RedisCache};
use beacon_ingestion::state::AppState;
use beacon_queue::RedisJobQueue;
use beacon_routing::{OnCallResolver, Router};
use beacon_store::{
    create_postgres_pool, AlertRepository, EscalationLevelRepository, EscalationPolicyRepository, IntegrationRepository,
    PostgresIncidentStore, ScheduleLayerRepository, ScheduleOverrideRepository, ScheduleRepository, ServiceRepository,
    TeamMemberRepository, TeamRepository, WebhookDeliveryRepository,
};
use beacon_utils::{init_logging, AppConfig};
use serde_json::json;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load().unwrap_or_else(|_| {
        eprintln!("failed to load configuration, using defaults");
        AppConfig::default()
    });
    init_logging(&config.logging)?;
    info!("starting beacon ingestion service");

    let pool = create_postgres_pool(&config.database.postgres_url, config.database.max_connections).await?;
    beacon_store::migrations::run_postgres_migrations(&pool).await?;

    let cache: beacon_cache::SharedCache = Arc::new(RedisCache::new(CacheConfig {
        redis_url: config.database.redis_url.clone(),
        ..Default::default()
    })?);
    let dedupe_queue = Arc::new(RedisJobQueue::new(&config.database.redis_url, "beacon:")?);
    let lifecycle_queue = Arc::new(RedisJobQueue::new(&config.database.redis_url, "beacon:")?);

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
        pool: pool.clone(),
        integrations: Arc::new(IntegrationRepository::new(pool.clone())),
        alerts: Arc::new(AlertRepository::new(pool.clone())),
        deliveries: Arc::new(WebhookDeliveryRepository::new(pool.clone())),
        incidents: Arc::new(PostgresIncidentStore::new(pool.clone())),
        router,
        cache,
        dedupe_queue,
        lifecycle_queue,
        config: config.clone(),
    };

    let app = AxumRouter::new()
        .route("/health", get(health))
        .route("/webhooks/alerts/:integration_name", post(beacon_ingestion::handler::ingest_webhook))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::new().allow_origin(Any).allow_methods([Method::POST, Method::GET]).allow_headers([header::CONTENT_TYPE]))
                .layer(DefaultBodyLimit::max(config.server.max_request_size)),
        )
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "ingestion service listening");
    serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "healthy", "service": "beacon-ingestion", "timestamp": chrono::Utc::now().to_rfc3339()}))
}

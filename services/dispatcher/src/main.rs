//! Beacon Dispatcher Service: drains `notification_dispatch` jobs, terminates inbound Twilio/Slack webhooks that translate
//! replies into acknowledge/resolve calls, and reconciles Twilio delivery-status callbacks into NotificationLog outcomes.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::routing::{get, post};
use axum::{serve, Json, Router as AxumRouter};
use beacon_dispatcher::{run_worker, AppState};
use beacon_providers::{
    ChatChannel, ChatProviderConfig, CircuitBreakerConfig, EmailChannel, ProviderRegistry, PushChannel, PushProviderConfig, SmsChannel,
    SmsProviderConfig, SmtpConfig, VoiceChannel, VoiceProviderConfig,
};
use beacon_queue::RedisJobQueue;
use beacon_store::{create_postgres_pool, PostgresIncidentStore, PostgresNotificationLogStore, TeamMemberRepository};
use beacon_utils::{init_logging, AppConfig};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;

fn build_registry(config: &AppConfig) -> ProviderRegistry {
    let breaker = CircuitBreakerConfig::default();
    let mut registry = ProviderRegistry::new();

    registry.register(beacon_models::NotificationChannelKind::Email, Arc::new(EmailChannel::new(SmtpConfig::default())));

    registry.register(
        beacon_models::NotificationChannelKind::Sms,
        Arc::new(SmsChannel::new(
            vec![SmsProviderConfig {
                name: "twilio".to_string(),
                api_base: config.twilio.api_base.clone(),
                auth_token: config.twilio.auth_token.clone(),
                from_number: config.twilio.from_number.clone(),
            }],
            breaker,
        )),
    );

    registry.register(
        beacon_models::NotificationChannelKind::Voice,
        Arc::new(VoiceChannel::new(
            VoiceProviderConfig {
                name: "twilio-voice".to_string(),
                api_base: config.twilio.api_base.clone(),
                auth_token: config.twilio.auth_token.clone(),
                from_number: config.twilio.from_number.clone(),
            },
            breaker,
        )),
    );

    registry.register(
        beacon_models::NotificationChannelKind::Slack,
        Arc::new(ChatChannel::new(
            ChatProviderConfig { name: "slack".to_string(), api_base: config.slack.api_base.clone(), auth_token: config.slack.bot_token.clone() },
            breaker,
        )),
    );

    registry.register(
        beacon_models::NotificationChannelKind::Push,
        Arc::new(PushChannel::new(
            PushProviderConfig {
                name: "push".to_string(),
                api_base: std::env::var("PUSH_API_BASE").unwrap_or_else(|_| "https://push.beacon.io".to_string()),
                auth_token: std::env::var("PUSH_AUTH_TOKEN").unwrap_or_default(),
            },
            breaker,
        )),
    );

    registry
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load().unwrap_or_else(|_| {
        eprintln!("failed to load configuration, using defaults");
        AppConfig::default()
    });
    init_logging(&config.logging)?;
    info!("starting beacon dispatcher service");

    let pool = create_postgres_pool(&config.database.postgres_url, config.database.max_connections).await?;
    beacon_store::migrations::run_postgres_migrations(&pool).await?;

    let state = AppState {
        incidents: Arc::new(PostgresIncidentStore::new(pool.clone())),
        team_members: Arc::new(TeamMemberRepository::new(pool.clone())),
        notification_logs: Arc::new(PostgresNotificationLogStore::new(pool.clone())),
        registry: Arc::new(build_registry(&config)),
        notification_queue: Arc::new(RedisJobQueue::new(&config.database.redis_url, "beacon:")?),
        lifecycle_queue: Arc::new(RedisJobQueue::new(&config.database.redis_url, "beacon:")?),
        twilio: config.twilio.clone(),
        slack: config.slack.clone(),
    };

    let app = AxumRouter::new()
        .route("/health", get(health))
        .route("/webhooks/twilio/:channel", post(beacon_dispatcher::inbound::twilio_inbound))
        .route("/webhooks/twilio/status/:channel/:log_id", post(beacon_dispatcher::inbound::twilio_delivery_status))
        .route("/webhooks/slack/:surface", post(beacon_dispatcher::inbound::slack_inbound))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "dispatcher service listening");

    tokio::select! {
        result = serve(listener, app) => result.map_err(Into::into),
        _ = run_worker(state, Duration::from_millis(500)) => Ok(()),
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "healthy", "service": "beacon-dispatcher", "timestamp": chrono::Utc::now().to_rfc3339()}))
}

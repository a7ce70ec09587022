//! Thin aggregating front door: health/readiness, Prometheus metrics, and
//! the CORS/tracing/request-id middleware stack shared by the fleet.
//! Stands in for the HTTP CRUD perimeter this workspace doesn't build out.

use anyhow::Result;
use axum::{extract::DefaultBodyLimit, http::{header, Method}, routing::get, serve, Router};
use beacon_store::{initialize_databases, DatabaseConfig, PostgresPool, RedisPool};
use beacon_utils::{init_logging, AppConfig};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

mod handlers;
mod middleware;
mod routes;

use middleware::*;

#[derive(Clone)]
pub struct AppState {
    pub postgres_pool: PostgresPool,
    pub redis_pool: RedisPool,
    pub config: AppConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load().unwrap_or_else(|_| {
        eprintln!("failed to load configuration, using defaults");
        AppConfig::default()
    });

    init_logging(&config.logging)?;
    info!("starting beacon gateway service");

    let db_config = DatabaseConfig {
        postgres_url: config.database.postgres_url.clone(),
        redis_url: config.database.redis_url.clone(),
        max_connections: config.database.max_connections,
        connection_timeout: std::time::Duration::from_secs(config.database.connection_timeout_seconds),
    };
    let (postgres_pool, redis_pool) = initialize_databases(&db_config).await?;
    info!("database connections established");

    let app = create_app(postgres_pool, redis_pool, &config);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "gateway listening");

    serve(listener, app).await?;
    Ok(())
}

fn create_app(postgres_pool: PostgresPool, redis_pool: RedisPool, config: &AppConfig) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics))
        .nest("/api/v1", routes::create_api_routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
                        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]),
                )
                .layer(DefaultBodyLimit::max(config.server.max_request_size))
                .layer(axum::middleware::from_fn(request_id_middleware))
                .layer(axum::middleware::from_fn(error_handling_middleware)),
        )
        .with_state(AppState { postgres_pool, redis_pool, config: config.clone() })
}

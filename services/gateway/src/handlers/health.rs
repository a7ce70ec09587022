use axum::{extract::State, response::Json};
use beacon_store::{postgres_health_check, redis_health_check};
use prometheus::TextEncoder;
use serde_json::{json, Value};

use crate::AppState;

pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let mut body = json!({
        "status": "healthy",
        "service": "beacon-gateway",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "checks": {}
    });

    let postgres_status = match postgres_health_check(&state.postgres_pool).await {
        Ok(_) => json!({"status": "healthy"}),
        Err(e) => json!({"status": "unhealthy", "message": e.to_string()}),
    };
    body["checks"]["postgres"] = postgres_status;

    let mut redis_pool = state.redis_pool.clone();
    let redis_status = match redis_health_check(&mut redis_pool).await {
        Ok(_) => json!({"status": "healthy"}),
        Err(e) => json!({"status": "unhealthy", "message": e.to_string()}),
    };
    body["checks"]["redis"] = redis_status;

    let all_healthy = body["checks"].as_object().unwrap().values().all(|check| check["status"] == "healthy");
    if !all_healthy {
        body["status"] = json!("degraded");
    }

    Json(body)
}

pub async fn metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode_to_string(&metric_families).unwrap_or_else(|_| "error encoding metrics".to_string())
}

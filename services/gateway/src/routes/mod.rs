use axum::{routing::get, Router};

use crate::{handlers, AppState};

pub fn create_api_routes() -> Router<AppState> {
    Router::new().route("/health/detailed", get(handlers::health_check))
}

//! Health check endpoints.

use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/wishlist-notifications/health", get(service_health))
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "stockpulse-api",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// GET /api/wishlist-notifications/health: Plain-text liveness check.
async fn service_health() -> &'static str {
    "Wishlist Notification Service is running"
}

//! Shared application state for the Axum API server.

use std::sync::Arc;

use stockpulse_engine::NotificationPipeline;
use stockpulse_engine::store::WishlistStore;

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<NotificationPipeline>,
    pub store: Arc<dyn WishlistStore>,
}

impl AppState {
    pub fn new(pipeline: Arc<NotificationPipeline>, store: Arc<dyn WishlistStore>) -> Self {
        Self { pipeline, store }
    }
}

//! Manual pipeline triggers.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use stockpulse_common::error::AppError;
use stockpulse_common::types::{QueueMessage, Wishlist};
use stockpulse_engine::{PipelineOutcome, PipelineState};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/wishlist-notifications/process", post(process_message))
        .route("/api/wishlist-notifications/process-json", post(process_json))
        .route("/api/wishlist-notifications/test/{wishlist_id}", get(process_by_id))
        .route("/api/wishlist-notifications/pending", get(list_pending))
}

#[derive(Debug, Serialize)]
pub struct ProcessResponse {
    pub wishlist_id: String,
    pub state: PipelineState,
    pub message: String,
}

impl From<PipelineOutcome> for ProcessResponse {
    fn from(outcome: PipelineOutcome) -> Self {
        let message = match outcome.state {
            PipelineState::Skipped => "Wishlist already notified, nothing sent",
            _ => "Wishlist notification processed successfully",
        };
        Self {
            wishlist_id: outcome.wishlist_id,
            state: outcome.state,
            message: message.to_string(),
        }
    }
}

/// POST /api/wishlist-notifications/process: Run a decoded queue message.
async fn process_message(
    State(state): State<AppState>,
    payload: Result<Json<QueueMessage>, JsonRejection>,
) -> Result<Json<ProcessResponse>, AppError> {
    let Json(msg) = payload.map_err(|e| AppError::Validation(e.body_text()))?;
    tracing::info!(id = ?msg.id, "Processing wishlist notification via REST API");
    let outcome = state.pipeline.process_message(&msg).await?;
    Ok(Json(outcome.into()))
}

/// POST /api/wishlist-notifications/process-json: Run a raw queue payload.
async fn process_json(
    State(state): State<AppState>,
    body: String,
) -> Result<Json<ProcessResponse>, AppError> {
    tracing::info!(payload = %body, "Processing wishlist notification from JSON");
    let outcome = state.pipeline.process_raw(&body).await?;
    Ok(Json(outcome.into()))
}

/// GET /api/wishlist-notifications/test/{wishlist_id}: Run a bare wishlist id.
async fn process_by_id(
    State(state): State<AppState>,
    Path(wishlist_id): Path<String>,
) -> Result<Json<ProcessResponse>, AppError> {
    tracing::info!(wishlist_id = %wishlist_id, "Testing wishlist notification");
    let outcome = state.pipeline.process_id(&wishlist_id).await?;
    Ok(Json(outcome.into()))
}

/// GET /api/wishlist-notifications/pending: Active wishlists not yet notified.
async fn list_pending(State(state): State<AppState>) -> Result<Json<Vec<Wishlist>>, AppError> {
    let wishlists = state.store.list_pending_wishlists().await?;
    Ok(Json(wishlists))
}

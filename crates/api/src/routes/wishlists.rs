//! Read-only wishlist queries.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use stockpulse_common::error::AppError;
use stockpulse_common::types::Wishlist;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/users/{user_id}/wishlists", get(list_user_wishlists))
}

#[derive(Debug, Deserialize)]
pub struct WishlistQuery {
    #[serde(default)]
    pub active_only: bool,
}

/// GET /api/users/{user_id}/wishlists: A user's wishlists, newest first.
async fn list_user_wishlists(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<WishlistQuery>,
) -> Result<Json<Vec<Wishlist>>, AppError> {
    let wishlists = state
        .store
        .list_wishlists_by_user(&user_id, query.active_only)
        .await?;
    Ok(Json(wishlists))
}

//! Manual-trigger HTTP API for the wishlist notification pipeline.
//!
//! Endpoints:
//! - GET  /health
//! - GET  /api/wishlist-notifications/health
//! - POST /api/wishlist-notifications/process
//! - POST /api/wishlist-notifications/process-json
//! - GET  /api/wishlist-notifications/test/{wishlist_id}
//! - GET  /api/wishlist-notifications/pending
//! - GET  /api/users/{user_id}/wishlists

pub mod routes;
pub mod state;

//! StockPulse manual-trigger API server binary entrypoint.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use stockpulse_common::config::AppConfig;
use stockpulse_common::db::create_pool;
use stockpulse_common::redis_pool::create_redis_pool;
use stockpulse_engine::NotificationPipeline;
use stockpulse_engine::lock::RedisClaimLock;
use stockpulse_engine::store::{PgStore, WishlistStore};
use stockpulse_notifier::{EmailNotifier, transport_from_config};

use stockpulse_api::routes::create_router;
use stockpulse_api::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("stockpulse_api=debug,stockpulse_engine=debug,tower_http=debug")
        }))
        .init();

    tracing::info!("Starting StockPulse API server...");

    // Load configuration
    let config = AppConfig::from_env()?;
    let store_timeout = Duration::from_millis(config.store_timeout_ms);

    // Create database connection pool
    let pool = create_pool(&config.database_url, config.db_max_connections, store_timeout).await?;
    tracing::info!("Database pool created");

    // Claims are shared with the queue consumer
    let redis = create_redis_pool(&config.redis_url).await?;
    tracing::info!("Redis connection established");

    let store: Arc<dyn WishlistStore> = Arc::new(PgStore::new(pool));
    let claims = RedisClaimLock::new(redis).with_ttl(Duration::from_millis(config.claim_ttl_ms));
    let pipeline = NotificationPipeline::new(
        store.clone(),
        EmailNotifier::new(transport_from_config(&config)),
        Arc::new(claims),
    )
    .with_timeouts(store_timeout, Duration::from_millis(config.notify_timeout_ms));

    // Build application state
    let state = AppState::new(Arc::new(pipeline), store);

    // Build router
    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.api_port));
    tracing::info!("API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

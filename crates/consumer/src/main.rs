use std::sync::Arc;
use std::time::Duration;

use stockpulse_common::config::AppConfig;
use stockpulse_common::{db, redis_pool};
use stockpulse_consumer::{QueueConsumer, RedisDeadLetter, RedisQueueSource, RetryPolicy};
use stockpulse_engine::NotificationPipeline;
use stockpulse_engine::lock::RedisClaimLock;
use stockpulse_engine::store::PgStore;
use stockpulse_notifier::{EmailNotifier, transport_from_config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stockpulse_consumer=info,stockpulse_engine=info,stockpulse_notifier=info".into()),
        )
        .json()
        .init();

    tracing::info!("StockPulse notification consumer starting...");

    // Load configuration
    let config = AppConfig::from_env()?;
    let store_timeout = Duration::from_millis(config.store_timeout_ms);

    // Connect to database
    let pool = db::create_pool(&config.database_url, config.db_max_connections, store_timeout).await?;

    // Run migrations
    sqlx::migrate!("../../migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    // Connect to Redis (queue, claims, dead letters)
    let redis = redis_pool::create_redis_pool(&config.redis_url).await?;

    let claims = RedisClaimLock::new(redis.clone())
        .with_ttl(Duration::from_millis(config.claim_ttl_ms));
    let pipeline = NotificationPipeline::new(
        Arc::new(PgStore::new(pool)),
        EmailNotifier::new(transport_from_config(&config)),
        Arc::new(claims),
    )
    .with_timeouts(store_timeout, Duration::from_millis(config.notify_timeout_ms));

    let mut consumer = QueueConsumer::new(Arc::new(pipeline)).with_retry(RetryPolicy::from_config(&config));
    if let Some(queue) = &config.dead_letter_queue {
        tracing::info!(queue = %queue, "Dead-letter queue enabled");
        consumer = consumer.with_dead_letter(Arc::new(RedisDeadLetter::new(redis.clone(), queue.clone())));
    }

    let mut source = RedisQueueSource::new(
        redis,
        config.queue_name.clone(),
        Duration::from_secs(config.queue_poll_timeout_secs),
    );

    tracing::info!(queue = %source.queue(), "Listening for wishlist notifications");

    // Run with graceful shutdown on Ctrl+C
    tokio::select! {
        _ = consumer.run(&mut source) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal, stopping gracefully...");
        }
    }

    tracing::info!("StockPulse notification consumer stopped.");
    Ok(())
}

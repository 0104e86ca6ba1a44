use redis::Client;
use redis::aio::ConnectionManager;

/// Create a Redis connection manager shared by the claim lock, queue source and
/// dead-letter sink. Fails fast with a `PING` so a bad URL surfaces at startup.
pub async fn create_redis_pool(redis_url: &str) -> anyhow::Result<ConnectionManager> {
    let client = Client::open(redis_url)?;
    let mut manager = ConnectionManager::new(client).await?;

    let pong: String = redis::cmd("PING").query_async(&mut manager).await?;
    tracing::info!(reply = %pong, "Connected to Redis");
    Ok(manager)
}

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;

use stockpulse_common::error::AppError;

/// Where queue payloads come from.
#[async_trait]
pub trait MessageSource: Send {
    /// Wait for the next payload. `Ok(None)` means the wait timed out empty.
    async fn receive(&mut self) -> Result<Option<String>, AppError>;
}

/// Redis list source. Producers `LPUSH`, this pops with `BRPOP` (FIFO).
pub struct RedisQueueSource {
    redis: ConnectionManager,
    queue: String,
    poll_timeout: Duration,
}

impl RedisQueueSource {
    pub fn new(redis: ConnectionManager, queue: impl Into<String>, poll_timeout: Duration) -> Self {
        Self {
            redis,
            queue: queue.into(),
            poll_timeout,
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }
}

#[async_trait]
impl MessageSource for RedisQueueSource {
    async fn receive(&mut self) -> Result<Option<String>, AppError> {
        // BRPOP queue timeout
        // Returns [queue, payload], or nil once the timeout elapses
        let popped: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(&self.queue)
            .arg(self.poll_timeout.as_secs().max(1))
            .query_async(&mut self.redis)
            .await?;

        Ok(popped.map(|(_, payload)| payload))
    }
}

//! Per-message handling: run the pipeline, retry what is worth retrying, then
//! settle the payload as processed, dropped or dead-lettered.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use serde::Serialize;

use stockpulse_common::config::AppConfig;
use stockpulse_common::error::AppError;
use stockpulse_engine::{ErrorKind, NotificationPipeline, PipelineFailure, PipelineOutcome, PipelineState};

use crate::source::MessageSource;

/// Pause after a failed receive before polling again.
const DEFAULT_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// How often a retryable failure is re-run before the payload is settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_backoff: Duration) -> Self {
        Self {
            max_retries,
            base_backoff,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_millis(config.retry_backoff_ms),
        )
    }

    /// Delay before retry number `attempt` (0-based): `base * 2^attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_backoff.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// A payload that could not be processed, as stored for manual review.
#[derive(Debug, Clone, Serialize)]
pub struct DeadLetterRecord {
    pub payload: String,
    pub kind: ErrorKind,
    pub state: PipelineState,
    pub error: String,
    pub attempts: u32,
    pub failed_at: DateTime<Utc>,
}

impl DeadLetterRecord {
    fn new(payload: &str, failure: &PipelineFailure, attempts: u32) -> Self {
        Self {
            payload: payload.to_string(),
            kind: failure.kind(),
            state: failure.state,
            error: failure.error.to_string(),
            attempts,
            failed_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn push(&self, record: &DeadLetterRecord) -> Result<(), AppError>;
}

/// Dead letters as JSON entries on a Redis list.
pub struct RedisDeadLetter {
    redis: ConnectionManager,
    queue: String,
}

impl RedisDeadLetter {
    pub fn new(redis: ConnectionManager, queue: impl Into<String>) -> Self {
        Self {
            redis,
            queue: queue.into(),
        }
    }
}

#[async_trait]
impl DeadLetterSink for RedisDeadLetter {
    async fn push(&self, record: &DeadLetterRecord) -> Result<(), AppError> {
        let entry = serde_json::to_string(record)
            .map_err(|e| AppError::Internal(format!("Failed to encode dead letter: {}", e)))?;

        let mut redis = self.redis.clone();
        let _: i64 = redis::cmd("LPUSH")
            .arg(&self.queue)
            .arg(entry)
            .query_async(&mut redis)
            .await?;
        Ok(())
    }
}

/// What happened to a payload.
#[derive(Debug)]
pub enum Disposition {
    Processed(PipelineOutcome),
    /// Failed and logged; no dead-letter sink configured or the push failed.
    Dropped(PipelineFailure),
    DeadLettered(PipelineFailure),
}

pub struct QueueConsumer {
    pipeline: Arc<NotificationPipeline>,
    retry: RetryPolicy,
    dead_letter: Option<Arc<dyn DeadLetterSink>>,
    error_backoff: Duration,
}

impl QueueConsumer {
    /// Consumer with no retries and no dead-letter sink.
    pub fn new(pipeline: Arc<NotificationPipeline>) -> Self {
        Self {
            pipeline,
            retry: RetryPolicy::default(),
            dead_letter: None,
            error_backoff: DEFAULT_ERROR_BACKOFF,
        }
    }

    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_dead_letter(mut self, sink: Arc<dyn DeadLetterSink>) -> Self {
        self.dead_letter = Some(sink);
        self
    }

    /// Handle one payload to completion. Never fails; the outcome is the disposition.
    pub async fn consume(&self, payload: &str) -> Disposition {
        tracing::info!(payload, "Received queue message");

        let mut attempt = 0;
        loop {
            let failure = match self.pipeline.process_raw(payload).await {
                Ok(outcome) => {
                    tracing::info!(
                        wishlist_id = %outcome.wishlist_id,
                        state = %outcome.state,
                        "Successfully processed queue message"
                    );
                    return Disposition::Processed(outcome);
                }
                Err(failure) => failure,
            };

            if failure.kind().is_retryable() && attempt < self.retry.max_retries {
                let delay = self.retry.backoff(attempt);
                attempt += 1;
                tracing::warn!(
                    payload,
                    kind = %failure.kind(),
                    attempt,
                    max_retries = self.retry.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying queue message"
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            return self.settle(payload, failure, attempt + 1).await;
        }
    }

    async fn settle(&self, payload: &str, failure: PipelineFailure, attempts: u32) -> Disposition {
        if failure.kind().is_business() {
            tracing::warn!(
                payload,
                kind = %failure.kind(),
                error = %failure.error,
                "Business error, message might need manual intervention"
            );
        } else {
            tracing::error!(
                payload,
                kind = %failure.kind(),
                attempts,
                error = %failure.error,
                "Unexpected error processing queue message"
            );
        }

        let Some(sink) = &self.dead_letter else {
            return Disposition::Dropped(failure);
        };

        let record = DeadLetterRecord::new(payload, &failure, attempts);
        match sink.push(&record).await {
            Ok(()) => {
                tracing::info!(payload, kind = %record.kind, "Message dead-lettered");
                Disposition::DeadLettered(failure)
            }
            Err(e) => {
                tracing::error!(payload, error = %e, "Failed to dead-letter message, dropping it");
                Disposition::Dropped(failure)
            }
        }
    }

    /// Pull and consume payloads forever. Receive errors are logged and polled
    /// through after `error_backoff`; stop the consumer by dropping this future.
    pub async fn run<S: MessageSource>(&self, source: &mut S) {
        tracing::info!(
            max_retries = self.retry.max_retries,
            dead_letter = self.dead_letter.is_some(),
            "Queue consumer started"
        );

        loop {
            match source.receive().await {
                Ok(Some(payload)) => {
                    self.consume(&payload).await;
                }
                Ok(None) => tracing::trace!("Queue empty, polling again"),
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        backoff_ms = self.error_backoff.as_millis() as u64,
                        "Failed to receive from queue, retrying"
                    );
                    tokio::time::sleep(self.error_backoff).await;
                }
            }
        }
    }
}

//! Wishlist notification pipeline.
//!
//! Runs one message end to end:
//! 1. Decode and validate the `userId::stockId` identifier
//! 2. Claim the wishlist id so concurrent deliveries cannot both dispatch
//! 3. Resolve user (and check the recipient), stock, then wishlist, which must
//!    belong to that user and stock
//! 4. Skip wishlists that are already notified
//! 5. Dispatch the alert email
//! 6. Write the notified flag conditionally, then release the claim
//!
//! Any failure stops the run before the flag is written, except a failed write
//! after a successful send, which is reported as `NotifyFailed`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use stockpulse_common::types::QueueMessage;
use stockpulse_notifier::EmailNotifier;

use crate::codec::{MessageCodec, WishlistKey};
use crate::error::{ErrorKind, PipelineFailure, ProcessingError};
use crate::lock::ClaimLock;
use crate::resolver::EntityResolver;
use crate::store::WishlistStore;

/// Default upper bound on a single store call.
const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default upper bound on a notification dispatch.
const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Where a pipeline run is, or where it ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Received,
    Parsed,
    Resolved,
    Notifying,
    /// Alert sent and flag persisted.
    Notified,
    /// Wishlist was already notified; nothing sent.
    Skipped,
    /// Message, identifier, recipient or records were unusable.
    Rejected,
    /// Transport failed, or the flag write after a successful send failed.
    NotifyFailed,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PipelineState::Notified
                | PipelineState::Skipped
                | PipelineState::Rejected
                | PipelineState::NotifyFailed
        )
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineState::Received => write!(f, "received"),
            PipelineState::Parsed => write!(f, "parsed"),
            PipelineState::Resolved => write!(f, "resolved"),
            PipelineState::Notifying => write!(f, "notifying"),
            PipelineState::Notified => write!(f, "notified"),
            PipelineState::Skipped => write!(f, "skipped"),
            PipelineState::Rejected => write!(f, "rejected"),
            PipelineState::NotifyFailed => write!(f, "notify_failed"),
        }
    }
}

/// A successful pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineOutcome {
    pub wishlist_id: String,
    /// `Notified` or `Skipped`.
    pub state: PipelineState,
    /// Timestamp written to the wishlist, when one was written.
    pub notified_at: Option<DateTime<Utc>>,
}

/// Orchestrates decode → claim → resolve → dispatch → mark notified.
pub struct NotificationPipeline {
    resolver: EntityResolver,
    store: Arc<dyn WishlistStore>,
    notifier: EmailNotifier,
    claims: Arc<dyn ClaimLock>,
    store_timeout: Duration,
    notify_timeout: Duration,
}

impl NotificationPipeline {
    pub fn new(
        store: Arc<dyn WishlistStore>,
        notifier: EmailNotifier,
        claims: Arc<dyn ClaimLock>,
    ) -> Self {
        Self {
            resolver: EntityResolver::new(store.clone()).with_timeout(DEFAULT_STORE_TIMEOUT),
            store,
            notifier,
            claims,
            store_timeout: DEFAULT_STORE_TIMEOUT,
            notify_timeout: DEFAULT_NOTIFY_TIMEOUT,
        }
    }

    /// Bound every store call by `store_timeout` and each dispatch by `notify_timeout`.
    pub fn with_timeouts(mut self, store_timeout: Duration, notify_timeout: Duration) -> Self {
        self.resolver = self.resolver.with_timeout(store_timeout);
        self.store_timeout = store_timeout;
        self.notify_timeout = notify_timeout;
        self
    }

    /// Process a raw queue payload (`{"id": "..."}`).
    pub async fn process_raw(&self, raw: &str) -> Result<PipelineOutcome, PipelineFailure> {
        let msg = MessageCodec::parse(raw)
            .map_err(|e| Self::log_failure(raw, Self::fail(PipelineState::Received, e)))?;
        self.process_message(&msg).await
    }

    /// Process a bare wishlist id by synthesizing a minimal message.
    pub async fn process_id(&self, wishlist_id: &str) -> Result<PipelineOutcome, PipelineFailure> {
        self.process_message(&QueueMessage::new(wishlist_id)).await
    }

    /// Process an already-decoded message.
    pub async fn process_message(
        &self,
        msg: &QueueMessage,
    ) -> Result<PipelineOutcome, PipelineFailure> {
        let label = msg.id.as_deref().unwrap_or("<none>");

        let key = MessageCodec::validate(msg)
            .map_err(|e| Self::log_failure(label, Self::fail(PipelineState::Received, e)))?;

        tracing::info!(
            wishlist_id = %key.wishlist_id,
            user_id = %key.user_id,
            stock_id = %key.stock_id,
            "Processing wishlist notification"
        );

        self.process_key(&key)
            .await
            .map_err(|failure| Self::log_failure(&key.wishlist_id, failure))
    }

    async fn process_key(&self, key: &WishlistKey) -> Result<PipelineOutcome, PipelineFailure> {
        let acquired =
            tokio::time::timeout(self.store_timeout, self.claims.acquire(&key.wishlist_id)).await;

        let guard = match acquired {
            Ok(Ok(Some(guard))) => guard,
            Ok(Ok(None)) => {
                return Err(Self::fail(
                    PipelineState::Parsed,
                    ProcessingError::Contended {
                        wishlist_id: key.wishlist_id.clone(),
                    },
                ));
            }
            Ok(Err(e)) => return Err(Self::fail(PipelineState::Parsed, e.into())),
            Err(_) => {
                return Err(Self::fail(
                    PipelineState::Parsed,
                    ProcessingError::Timeout {
                        operation: "claim acquire",
                    },
                ));
            }
        };

        // If this future is dropped here, the guard releases the claim itself.
        let result = self.run_claimed(key).await;

        match tokio::time::timeout(self.store_timeout, self.claims.release(guard)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(
                wishlist_id = %key.wishlist_id,
                error = %e,
                "Failed to release wishlist claim; it will expire on its own"
            ),
            Err(_) => tracing::warn!(
                wishlist_id = %key.wishlist_id,
                timeout = ?self.store_timeout,
                "Timed out releasing wishlist claim; it will expire on its own"
            ),
        }

        result
    }

    async fn run_claimed(&self, key: &WishlistKey) -> Result<PipelineOutcome, PipelineFailure> {
        let mut state = PipelineState::Parsed;

        let user = self
            .resolver
            .get_user(&key.user_id)
            .await
            .map_err(|e| Self::fail(state, e))?;

        if !EmailNotifier::is_valid_recipient(user.email_address()) {
            return Err(Self::fail(
                state,
                ProcessingError::InvalidRecipient {
                    user_id: user.id.clone(),
                    email: user.email_address().to_string(),
                },
            ));
        }
        state = PipelineState::Resolved;

        let stock = self
            .resolver
            .get_stock(&key.stock_id)
            .await
            .map_err(|e| Self::fail(state, e))?;

        let wishlist = self
            .resolver
            .get_wishlist(&key.wishlist_id)
            .await
            .map_err(|e| Self::fail(state, e))?;

        if !wishlist.has_consistent_id() {
            return Err(Self::fail(
                state,
                ProcessingError::InvalidIdentifier(format!(
                    "wishlist {} belongs to user {} and stock {}",
                    wishlist.id, wishlist.user_id, wishlist.stock_id
                )),
            ));
        }

        if wishlist.notified {
            tracing::info!(
                wishlist_id = %wishlist.id,
                "Wishlist already notified, skipping dispatch"
            );
            return Ok(PipelineOutcome {
                wishlist_id: wishlist.id,
                state: PipelineState::Skipped,
                notified_at: None,
            });
        }

        let state = PipelineState::Notifying;

        let sent = tokio::time::timeout(
            self.notify_timeout,
            self.notifier.dispatch(&user, &stock, &wishlist),
        )
        .await;

        match sent {
            Ok(true) => {}
            Ok(false) => {
                return Err(Self::fail(
                    state,
                    ProcessingError::NotifyFailed {
                        recipient: user.email_address().to_string(),
                        reason: "transport reported failure".to_string(),
                    },
                ));
            }
            Err(_) => {
                return Err(Self::fail(
                    state,
                    ProcessingError::NotifyFailed {
                        recipient: user.email_address().to_string(),
                        reason: format!("dispatch timed out after {:?}", self.notify_timeout),
                    },
                ));
            }
        }

        // The alert is out; a failure below means a redelivery may send it again.
        let notified = wishlist.into_notified(Utc::now());
        let write = tokio::time::timeout(self.store_timeout, self.store.mark_notified(&notified)).await;

        let reason = match write {
            Ok(Ok(true)) => None,
            Ok(Ok(false)) => Some("wishlist was already notified or no longer exists".to_string()),
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some(format!("status update timed out after {:?}", self.store_timeout)),
        };

        if let Some(reason) = reason {
            return Err(Self::fail(
                state,
                ProcessingError::StatusUpdateFailed {
                    wishlist_id: notified.id,
                    reason,
                },
            ));
        }

        tracing::info!(
            wishlist_id = %notified.id,
            user = %user.email_address(),
            stock = %stock.name,
            "Wishlist notification processed"
        );

        Ok(PipelineOutcome {
            wishlist_id: notified.id,
            state: PipelineState::Notified,
            notified_at: Some(notified.updated_at),
        })
    }

    /// Resolve the terminal state for an error raised while in `state`.
    ///
    /// Taxonomy failures end in `Rejected` or `NotifyFailed`; unexpected faults
    /// keep the state the run was in.
    fn fail(state: PipelineState, error: ProcessingError) -> PipelineFailure {
        let terminal = match error.kind() {
            ErrorKind::Unexpected => state,
            ErrorKind::NotifyFailed => PipelineState::NotifyFailed,
            ErrorKind::Timeout if state == PipelineState::Notifying => PipelineState::NotifyFailed,
            _ => PipelineState::Rejected,
        };
        PipelineFailure::new(terminal, error)
    }

    fn log_failure(label: &str, failure: PipelineFailure) -> PipelineFailure {
        tracing::error!(
            input = %label,
            state = %failure.state,
            kind = %failure.kind(),
            error = %failure.error,
            "Wishlist notification failed"
        );
        failure
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockpulse_common::error::AppError;

    #[test]
    fn test_fail_classifies_taxonomy_errors() {
        let failure = NotificationPipeline::fail(
            PipelineState::Parsed,
            ProcessingError::InvalidIdentifier("empty".to_string()),
        );
        assert_eq!(failure.state, PipelineState::Rejected);

        let failure = NotificationPipeline::fail(
            PipelineState::Notifying,
            ProcessingError::NotifyFailed {
                recipient: "u1@x.com".to_string(),
                reason: "down".to_string(),
            },
        );
        assert_eq!(failure.state, PipelineState::NotifyFailed);
    }

    #[test]
    fn test_fail_timeout_depends_on_step() {
        let lookup = NotificationPipeline::fail(
            PipelineState::Parsed,
            ProcessingError::Timeout {
                operation: "user lookup",
            },
        );
        assert_eq!(lookup.state, PipelineState::Rejected);

        let dispatch = NotificationPipeline::fail(
            PipelineState::Notifying,
            ProcessingError::Timeout { operation: "dispatch" },
        );
        assert_eq!(dispatch.state, PipelineState::NotifyFailed);
    }

    #[test]
    fn test_fail_unexpected_keeps_current_state() {
        let failure = NotificationPipeline::fail(
            PipelineState::Resolved,
            ProcessingError::Unexpected(AppError::Internal("boom".to_string())),
        );
        assert_eq!(failure.state, PipelineState::Resolved);
        assert!(!failure.state.is_terminal());
    }
}

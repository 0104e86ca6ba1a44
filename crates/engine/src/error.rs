//! Processing error taxonomy for the notification pipeline.

use serde::Serialize;
use thiserror::Error;

use stockpulse_common::error::AppError;

use crate::pipeline::PipelineState;

/// Record kinds the pipeline resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Entity {
    User,
    Stock,
    Wishlist,
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Entity::User => write!(f, "user"),
            Entity::Stock => write!(f, "stock"),
            Entity::Wishlist => write!(f, "wishlist"),
        }
    }
}

/// Why a wishlist message could not be processed.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("Invalid message format: {payload}")]
    MalformedMessage {
        payload: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("{entity} not found with ID: {id}")]
    NotFound { entity: Entity, id: String },

    #[error("Invalid or missing email for user: {user_id}, email: {email}")]
    InvalidRecipient { user_id: String, email: String },

    #[error("Wishlist {wishlist_id} is already being processed by another delivery")]
    Contended { wishlist_id: String },

    #[error("Timed out during {operation}")]
    Timeout { operation: &'static str },

    #[error("Failed to send email notification to user: {recipient} ({reason})")]
    NotifyFailed { recipient: String, reason: String },

    #[error("Failed to update wishlist notified status for ID: {wishlist_id} ({reason})")]
    StatusUpdateFailed { wishlist_id: String, reason: String },

    #[error("Unexpected error processing wishlist notification: {0}")]
    Unexpected(#[from] AppError),
}

/// Discriminant of [`ProcessingError`], used for logging, retry and HTTP mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MalformedMessage,
    InvalidIdentifier,
    NotFound,
    InvalidRecipient,
    Contended,
    Timeout,
    NotifyFailed,
    Unexpected,
}

impl ErrorKind {
    /// Whether a fresh attempt could plausibly succeed without sending twice.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::Unexpected | ErrorKind::Timeout | ErrorKind::Contended
        )
    }

    /// Business failures come from the message or the data; the rest are system faults.
    pub fn is_business(self) -> bool {
        !matches!(self, ErrorKind::Unexpected | ErrorKind::Timeout)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::MalformedMessage => write!(f, "malformed_message"),
            ErrorKind::InvalidIdentifier => write!(f, "invalid_identifier"),
            ErrorKind::NotFound => write!(f, "not_found"),
            ErrorKind::InvalidRecipient => write!(f, "invalid_recipient"),
            ErrorKind::Contended => write!(f, "contended"),
            ErrorKind::Timeout => write!(f, "timeout"),
            ErrorKind::NotifyFailed => write!(f, "notify_failed"),
            ErrorKind::Unexpected => write!(f, "unexpected"),
        }
    }
}

impl ProcessingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProcessingError::MalformedMessage { .. } => ErrorKind::MalformedMessage,
            ProcessingError::InvalidIdentifier(_) => ErrorKind::InvalidIdentifier,
            ProcessingError::NotFound { .. } => ErrorKind::NotFound,
            ProcessingError::InvalidRecipient { .. } => ErrorKind::InvalidRecipient,
            ProcessingError::Contended { .. } => ErrorKind::Contended,
            ProcessingError::Timeout { .. } => ErrorKind::Timeout,
            ProcessingError::NotifyFailed { .. } | ProcessingError::StatusUpdateFailed { .. } => {
                ErrorKind::NotifyFailed
            }
            ProcessingError::Unexpected(_) => ErrorKind::Unexpected,
        }
    }
}

/// A pipeline run that stopped short of `Notified`.
///
/// `state` is the terminal state reached: `Rejected` or `NotifyFailed` for
/// taxonomy failures, or the state the run was in when an unexpected fault hit.
#[derive(Debug, Error)]
#[error("wishlist processing stopped at {state}: {error}")]
pub struct PipelineFailure {
    pub state: PipelineState,
    #[source]
    pub error: ProcessingError,
}

impl PipelineFailure {
    pub fn new(state: PipelineState, error: ProcessingError) -> Self {
        Self { state, error }
    }

    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}

impl From<PipelineFailure> for AppError {
    fn from(failure: PipelineFailure) -> Self {
        let message = failure.error.to_string();
        match failure.error {
            ProcessingError::MalformedMessage { .. }
            | ProcessingError::InvalidIdentifier(_)
            | ProcessingError::InvalidRecipient { .. } => AppError::Validation(message),
            ProcessingError::NotFound { .. } => AppError::NotFound(message),
            ProcessingError::Contended { .. } => AppError::Conflict(message),
            ProcessingError::Timeout { .. } => AppError::Timeout(message),
            ProcessingError::NotifyFailed { .. } | ProcessingError::StatusUpdateFailed { .. } => {
                AppError::Delivery(message)
            }
            ProcessingError::Unexpected(source) => source,
        }
    }
}

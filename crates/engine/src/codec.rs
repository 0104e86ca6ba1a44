//! Message codec: decodes and validates `{"id": "<userId>::<stockId>"}` payloads.

use stockpulse_common::types::{QueueMessage, WISHLIST_ID_SEPARATOR};

use crate::error::ProcessingError;

/// Identifiers derived from a validated message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WishlistKey {
    pub user_id: String,
    pub stock_id: String,
    /// The full message id, used verbatim as the wishlist storage key.
    pub wishlist_id: String,
}

/// Stateless decoder for queue messages.
pub struct MessageCodec;

impl MessageCodec {
    /// Decode a raw JSON payload into a [`QueueMessage`].
    pub fn parse(raw: &str) -> Result<QueueMessage, ProcessingError> {
        serde_json::from_str(raw).map_err(|source| ProcessingError::MalformedMessage {
            payload: raw.to_string(),
            source,
        })
    }

    /// Validate a message and split its id on the first `::`.
    ///
    /// Both halves must be non-blank; they are returned untrimmed. Anything after
    /// the first separator belongs to the stock id, so `a::b::c` yields stock `b::c`.
    pub fn validate(msg: &QueueMessage) -> Result<WishlistKey, ProcessingError> {
        let id = match msg.id.as_deref() {
            Some(id) if !id.trim().is_empty() => id,
            _ => {
                return Err(ProcessingError::InvalidIdentifier(
                    "message ID is null or empty".to_string(),
                ));
            }
        };

        let Some((user_id, stock_id)) = id.split_once(WISHLIST_ID_SEPARATOR) else {
            return Err(ProcessingError::InvalidIdentifier(format!(
                "expected format 'userId::stockId', got: {id}"
            )));
        };

        if user_id.trim().is_empty() {
            return Err(ProcessingError::InvalidIdentifier(format!(
                "user ID is empty in message: {id}"
            )));
        }
        if stock_id.trim().is_empty() {
            return Err(ProcessingError::InvalidIdentifier(format!(
                "stock ID is empty in message: {id}"
            )));
        }

        Ok(WishlistKey {
            user_id: user_id.to_string(),
            stock_id: stock_id.to_string(),
            wishlist_id: id.to_string(),
        })
    }

    /// `parse` followed by `validate`.
    pub fn decode(raw: &str) -> Result<WishlistKey, ProcessingError> {
        Self::validate(&Self::parse(raw)?)
    }
}

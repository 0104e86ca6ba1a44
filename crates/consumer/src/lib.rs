//! Queue consumer for wishlist notification messages.
//!
//! Pops `{"id": "userId::stockId"}` payloads from a [`MessageSource`] and runs
//! each through the notification pipeline, with optional retry and dead-lettering.

pub mod consumer;
pub mod source;

pub use consumer::{DeadLetterRecord, DeadLetterSink, Disposition, QueueConsumer, RedisDeadLetter, RetryPolicy};
pub use source::{MessageSource, RedisQueueSource};

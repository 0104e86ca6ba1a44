//! Wishlist notification engine.
//!
//! Turns a `{"id": "<userId>::<stockId>"}` message into at most one alert email:
//! parse → claim → resolve → dispatch → mark notified.

pub mod codec;
pub mod error;
pub mod lock;
pub mod pipeline;
pub mod resolver;
pub mod store;

pub use error::{Entity, ErrorKind, PipelineFailure, ProcessingError};
pub use pipeline::{NotificationPipeline, PipelineOutcome, PipelineState};

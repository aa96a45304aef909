//! Normalizes streaming chat-completion responses into one event stream.
//!
//! Every vendor speaks its own server-sent-events dialect. This crate decodes
//! the wire records, folds them into a complete message with per-vendor
//! accumulators, and emits a uniform [`ChatEvent`] per record. A spawned
//! relay turns the pull cursor into a cancellable channel.
//!
//! # Usage
//!
//! ```no_run
//! use llm_stream::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), StreamError> {
//! let registry = DecoderRegistry::default();
//! let response = reqwest::Client::new()
//!     .post("https://api.anthropic.com/v1/messages")
//!     .send()
//!     .await
//!     .map_err(|err| StreamError::transport(err.to_string()))?;
//!
//! let stream = Vendor::Anthropic.open(&registry, ResponseBody::from_reqwest(response));
//! let mut relay = spawn_relay(stream, 128, &CancellationToken::new());
//! while let Some(event) = relay.next_event().await {
//!     if let Some(text) = event.text() {
//!         print!("{text}");
//!     }
//! }
//! relay.finish().await?;
//! # Ok(())
//! # }
//! ```

/// Stream limits and their environment overrides.
pub mod config;
/// Content blocks and block deltas shared by all vendors.
pub mod content;
/// Wire decoders and the content-type registry.
pub mod decoder;
/// Error types returned by decoders, pipelines and the relay.
pub mod errors;
/// Process-wide tracing setup.
pub mod observability;
/// Decoder plus handler composition.
pub mod pipeline;
/// Common imports for typical usage.
pub mod prelude;
/// Pull-to-push bridge with cooperative cancellation.
pub mod relay;
/// Normalized stream events and response snapshots.
pub mod stream;
/// Vendor wire types, accumulators and handlers.
pub mod vendors;

#[cfg(test)]
mod fixtures;

pub use config::StreamConfig;
pub use content::{BlockDelta, ContentBlock, MediaSource};
pub use decoder::{BoxDecoder, Decoder, DecoderRegistry, RawEvent, ResponseBody};
pub use errors::{InvariantViolation, StreamError};
pub use pipeline::{Handler, JsonRecordHandler, Pipeline};
pub use relay::{EventRelay, relay, spawn_relay};
pub use stream::{
    ChatChoice, ChatEvent, ChatResponse, ChatUsage, EventDelta, EventKind, StopReason,
    ToolCallFragment,
};
pub use vendors::{ProtocolFamily, Vendor};

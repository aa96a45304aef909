//! Content-block message streams.
//!
//! Records are typed by the event-stream `event` field (`message_start`,
//! `content_block_delta`, ...) and address content blocks by position.
mod accumulator;
mod handler;
mod types;

pub use accumulator::MessageAccumulator;
pub use handler::{AnthropicEventHandler, AnthropicRecordHandler};
pub use types::{
    ApiErrorBody, Message, MessageDelta, MessageDeltaUsage, MessageStreamEvent, Usage,
};

//! Common imports for typical usage.
pub use crate::{
    ChatEvent, ChatResponse, ContentBlock, Decoder, DecoderRegistry, EventDelta, EventKind,
    EventRelay, ResponseBody, StopReason, StreamConfig, StreamError, Vendor, spawn_relay,
};
pub use tokio_util::sync::CancellationToken;

//! Vendor wire types, accumulators and event handlers.
//!
//! Vendors only differ in the handlers stacked on top of the wire decoder.
//! [`Vendor::open`] assembles the full pipeline for a response body.
use std::fmt;

use serde::{Deserialize, Deserializer};
use tracing::debug;

use crate::decoder::{BoxDecoder, DecoderRegistry, ResponseBody};
use crate::errors::StreamError;
use crate::pipeline::{JsonRecordHandler, Pipeline};
use crate::stream::ChatEvent;

pub mod anthropic;
pub mod openai;

/// Streaming wire protocol shared by a group of vendors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProtocolFamily {
    /// Typed records addressing indexed content blocks of one message.
    ContentBlocks,
    /// Untyped chat-completion chunks addressing indexed choices.
    ChatChunks,
}

/// Supported vendors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Vendor {
    Anthropic,
    OpenAi,
    Gemini,
    DeepSeek,
    OpenRouter,
}

impl Vendor {
    pub const ALL: [Vendor; 5] = [
        Vendor::Anthropic,
        Vendor::OpenAi,
        Vendor::Gemini,
        Vendor::DeepSeek,
        Vendor::OpenRouter,
    ];

    /// Looks a vendor up by its lower-case name.
    pub fn from_name(name: &str) -> Result<Self, StreamError> {
        let name = name.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|vendor| vendor.as_str() == name)
            .ok_or_else(|| StreamError::Config(format!("unknown vendor: {name}")))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
            Self::DeepSeek => "deepseek",
            Self::OpenRouter => "openrouter",
        }
    }

    pub fn family(self) -> ProtocolFamily {
        match self {
            Self::Anthropic => ProtocolFamily::ContentBlocks,
            Self::OpenAi | Self::Gemini | Self::DeepSeek | Self::OpenRouter => {
                ProtocolFamily::ChatChunks
            }
        }
    }

    /// Builds the normalized event stream for one response body.
    pub fn open(self, registry: &DecoderRegistry, body: ResponseBody) -> BoxDecoder<ChatEvent> {
        debug!(vendor = %self, content_type = ?body.content_type(), "opening vendor stream");
        let raw = registry.decoder_for(body);
        match self.family() {
            ProtocolFamily::ContentBlocks => Box::new(Pipeline::new(
                Pipeline::new(raw, anthropic::AnthropicRecordHandler::new()),
                anthropic::AnthropicEventHandler::new(),
            )),
            ProtocolFamily::ChatChunks => Box::new(Pipeline::new(
                Pipeline::new(
                    raw,
                    JsonRecordHandler::<openai::ChatCompletionChunk>::new("chat.completion.chunk"),
                ),
                openai::ChatChunkHandler::new(registry.config().max_index),
            )),
        }
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Vendor {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
    }
}

/// Deserializes an explicit `null` as the type's default.
pub(crate) fn null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

use serde::{Deserialize, Serialize};

use crate::content::{BlockDelta, ContentBlock};
use crate::errors::StreamError;
use crate::stream::{ChatChoice, ChatResponse, ChatUsage, StopReason};
use crate::vendors::null_default;

/// A complete or partially streamed message.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, deserialize_with = "null_default")]
    pub id: String,
    /// Always `message`.
    #[serde(rename = "type", default, deserialize_with = "null_default")]
    pub kind: String,
    #[serde(default, deserialize_with = "null_default")]
    pub role: String,
    #[serde(default, deserialize_with = "null_default")]
    pub content: Vec<ContentBlock>,
    #[serde(default, deserialize_with = "null_default")]
    pub model: String,
    #[serde(default)]
    pub stop_reason: Option<StopReason>,
    #[serde(default)]
    pub stop_sequence: Option<String>,
    #[serde(default, deserialize_with = "null_default")]
    pub usage: Usage,
}

impl Message {
    /// Converts to the vendor-neutral snapshot.
    pub fn to_chat_response(&self) -> ChatResponse {
        ChatResponse {
            id: self.id.clone(),
            model: self.model.clone(),
            choices: vec![ChatChoice {
                role: self.role.clone(),
                content: self.content.clone(),
                stop_reason: self.stop_reason.clone(),
            }],
            usage: ChatUsage {
                input_tokens: self.usage.input_tokens,
                output_tokens: self.usage.output_tokens,
                input_cached_tokens: self.usage.cache_read_input_tokens,
                input_cache_creation_tokens: self.usage.cache_creation_input_tokens,
                ..Default::default()
            },
        }
    }
}

/// Billing counters of a message.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default, deserialize_with = "null_default")]
    pub input_tokens: u64,
    #[serde(default, deserialize_with = "null_default")]
    pub output_tokens: u64,
    #[serde(default, deserialize_with = "null_default")]
    pub cache_creation_input_tokens: u64,
    #[serde(default, deserialize_with = "null_default")]
    pub cache_read_input_tokens: u64,
}

/// Cumulative counters sent with `message_delta`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDeltaUsage {
    #[serde(default, deserialize_with = "null_default")]
    pub output_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_creation_input_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_read_input_tokens: Option<u64>,
}

/// Top-level fields changed by `message_delta`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDelta {
    #[serde(default)]
    pub stop_reason: Option<StopReason>,
    #[serde(default)]
    pub stop_sequence: Option<String>,
}

/// Body of an `error` record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    #[serde(rename = "type", default, deserialize_with = "null_default")]
    pub kind: String,
    #[serde(default, deserialize_with = "null_default")]
    pub message: String,
}

/// One typed record of a message stream.
#[derive(Clone, Debug, PartialEq)]
pub enum MessageStreamEvent {
    MessageStart {
        message: Message,
    },
    ContentBlockStart {
        index: usize,
        content_block: ContentBlock,
    },
    ContentBlockDelta {
        index: usize,
        delta: BlockDelta,
    },
    ContentBlockStop {
        index: usize,
    },
    MessageDelta {
        delta: MessageDelta,
        usage: MessageDeltaUsage,
    },
    MessageStop,
    Ping,
    Error {
        error: ApiErrorBody,
    },
    /// Record type this crate does not model.
    Other {
        event_type: String,
        payload: serde_json::Value,
    },
}

#[derive(Deserialize)]
struct Tagged {
    #[serde(rename = "type", default)]
    kind: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MessageStartPayload {
    Wrapped { message: Message },
    Bare(Message),
}

#[derive(Deserialize)]
struct BlockStartPayload {
    index: usize,
    content_block: ContentBlock,
}

#[derive(Deserialize)]
struct BlockDeltaPayload {
    index: usize,
    delta: BlockDelta,
}

#[derive(Deserialize)]
struct BlockStopPayload {
    index: usize,
}

#[derive(Deserialize)]
struct MessageDeltaPayload {
    #[serde(default)]
    delta: MessageDelta,
    #[serde(default, deserialize_with = "null_default")]
    usage: MessageDeltaUsage,
}

#[derive(Deserialize)]
struct ErrorPayload {
    error: ApiErrorBody,
}

impl MessageStreamEvent {
    /// Decodes one record. `event_type` is the event-stream `event` field; when
    /// it is empty the payload's `type` field decides.
    pub fn decode(event_type: &str, data: &[u8]) -> Result<Self, StreamError> {
        let discriminator = if event_type.is_empty() {
            parse::<Tagged>("anthropic record", data)?.kind
        } else {
            event_type.to_string()
        };

        let event = match discriminator.as_str() {
            "message_start" => {
                let message = match parse::<MessageStartPayload>("message_start", data)? {
                    MessageStartPayload::Wrapped { message } => message,
                    MessageStartPayload::Bare(message) => message,
                };
                Self::MessageStart { message }
            }
            "content_block_start" => {
                let p: BlockStartPayload = parse("content_block_start", data)?;
                Self::ContentBlockStart {
                    index: p.index,
                    content_block: p.content_block,
                }
            }
            "content_block_delta" => {
                let p: BlockDeltaPayload = parse("content_block_delta", data)?;
                Self::ContentBlockDelta {
                    index: p.index,
                    delta: p.delta,
                }
            }
            "content_block_stop" => {
                let p: BlockStopPayload = parse("content_block_stop", data)?;
                Self::ContentBlockStop { index: p.index }
            }
            "message_delta" => {
                let p: MessageDeltaPayload = parse("message_delta", data)?;
                Self::MessageDelta {
                    delta: p.delta,
                    usage: p.usage,
                }
            }
            "message_stop" => Self::MessageStop,
            "ping" => Self::Ping,
            "error" => {
                let p: ErrorPayload = parse("error", data)?;
                Self::Error { error: p.error }
            }
            "" => {
                return Err(StreamError::decode(
                    "anthropic record",
                    "record has no event type",
                    data,
                ));
            }
            other => Self::Other {
                event_type: other.to_string(),
                payload: if data.trim_ascii().is_empty() {
                    serde_json::Value::Null
                } else {
                    parse(other, data)?
                },
            },
        };
        Ok(event)
    }

    /// Wire name of the record.
    pub fn event_type(&self) -> &str {
        match self {
            Self::MessageStart { .. } => "message_start",
            Self::ContentBlockStart { .. } => "content_block_start",
            Self::ContentBlockDelta { .. } => "content_block_delta",
            Self::ContentBlockStop { .. } => "content_block_stop",
            Self::MessageDelta { .. } => "message_delta",
            Self::MessageStop => "message_stop",
            Self::Ping => "ping",
            Self::Error { .. } => "error",
            Self::Other { event_type, .. } => event_type,
        }
    }
}

fn parse<T: serde::de::DeserializeOwned>(context: &str, data: &[u8]) -> Result<T, StreamError> {
    serde_json::from_slice(data).map_err(|e| StreamError::decode(context, e, data))
}

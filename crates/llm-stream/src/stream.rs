//! Vendor-neutral stream events and response snapshots.
use std::fmt;

use crate::content::ContentBlock;

/// Normalized stream event produced for every vendor record.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct ChatEvent {
    pub kind: EventKind,
    /// Incremental payload, when the record carried one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<EventDelta>,
    /// Snapshot of the accumulated response, attached to terminal and error events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<ChatResponse>,
}

impl ChatEvent {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            delta: None,
            message: None,
        }
    }

    pub fn with_delta(mut self, delta: EventDelta) -> Self {
        self.delta = Some(delta);
        self
    }

    pub fn with_message(mut self, message: ChatResponse) -> Self {
        self.message = Some(message);
        self
    }

    /// Text carried by the delta, if any.
    pub fn text(&self) -> Option<&str> {
        match &self.delta {
            Some(EventDelta::Text(text)) => Some(text),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, EventKind::MessageStop | EventKind::Error)
    }
}

/// Discriminator of a [`ChatEvent`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    MessageStart,
    ContentBlockStart,
    TextDelta,
    ThinkingDelta,
    ToolCallDelta,
    ContentBlockDelta,
    ContentBlockStop,
    MessageDelta,
    MessageStop,
    Ping,
    Error,
    /// Vendor record type with no common counterpart.
    Other(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::MessageStart => "message_start",
            Self::ContentBlockStart => "content_block_start",
            Self::TextDelta => "text_delta",
            Self::ThinkingDelta => "thinking_delta",
            Self::ToolCallDelta => "tool_call_delta",
            Self::ContentBlockDelta => "content_block_delta",
            Self::ContentBlockStop => "content_block_stop",
            Self::MessageDelta => "message_delta",
            Self::MessageStop => "message_stop",
            Self::Ping => "ping",
            Self::Error => "error",
            Self::Other(kind) => kind,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl serde::Serialize for EventKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Incremental payload of a [`ChatEvent`].
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum EventDelta {
    Text(String),
    ToolCalls(Vec<ToolCallFragment>),
    Json(serde_json::Value),
}

/// One piece of a tool call's arguments as it arrived on the wire.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct ToolCallFragment {
    /// Choice (or message, for single-message vendors) the call belongs to.
    pub choice: usize,
    /// Position of the call within its choice or of the block within the message.
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub arguments: String,
}

/// Vendor-neutral snapshot of a (possibly partial) response.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: ChatUsage,
}

impl ChatResponse {
    /// Concatenated text blocks of the first choice.
    pub fn text(&self) -> String {
        let mut out = String::new();
        if let Some(choice) = self.choices.first() {
            for text in choice.content.iter().filter_map(ContentBlock::as_text) {
                out.push_str(text);
            }
        }
        out
    }

    /// Returns `true` when the first choice has at least one content block.
    pub fn has_content(&self) -> bool {
        self.choices
            .first()
            .is_some_and(|choice| !choice.content.is_empty())
    }

    pub fn stop_reason(&self) -> Option<&StopReason> {
        self.choices.first().and_then(|c| c.stop_reason.as_ref())
    }
}

/// One alternative completion.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ChatChoice {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
}

/// Token counters in a vendor-neutral shape.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ChatUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub output_reasoning_tokens: u64,
    pub output_audio_tokens: u64,
    pub input_audio_tokens: u64,
    pub input_cached_tokens: u64,
    pub input_cache_creation_tokens: u64,
}

/// Why generation stopped.
///
/// Chunk-vendor finish reasons are folded into the same names, so `stop` reads
/// back as [`StopReason::EndTurn`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
    ToolUse,
    Other(String),
}

impl StopReason {
    pub fn as_str(&self) -> &str {
        match self {
            Self::EndTurn => "end_turn",
            Self::MaxTokens => "max_tokens",
            Self::StopSequence => "stop_sequence",
            Self::ToolUse => "tool_use",
            Self::Other(reason) => reason,
        }
    }
}

impl From<&str> for StopReason {
    fn from(value: &str) -> Self {
        match value {
            "end_turn" | "stop" => Self::EndTurn,
            "max_tokens" | "length" => Self::MaxTokens,
            "stop_sequence" => Self::StopSequence,
            "tool_use" | "tool_calls" => Self::ToolUse,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for StopReason {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<StopReason> for String {
    fn from(value: StopReason) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_reasons_map_to_common_stop_reasons() {
        assert_eq!(StopReason::from("stop"), StopReason::EndTurn);
        assert_eq!(StopReason::from("length"), StopReason::MaxTokens);
        assert_eq!(StopReason::from("tool_calls"), StopReason::ToolUse);
        assert_eq!(StopReason::from("stop_sequence"), StopReason::StopSequence);
        assert_eq!(
            StopReason::from("content_filter"),
            StopReason::Other("content_filter".into())
        );
    }

    #[test]
    fn stop_reason_serializes_as_string() {
        let value = serde_json::to_value(StopReason::EndTurn).expect("encode");
        assert_eq!(value, serde_json::json!("end_turn"));
        let reason: StopReason = serde_json::from_value(serde_json::json!("tool_use")).expect("decode");
        assert_eq!(reason, StopReason::ToolUse);
    }

    #[test]
    fn response_text_reads_first_choice_only() {
        let response = ChatResponse {
            choices: vec![
                ChatChoice {
                    role: "assistant".into(),
                    content: vec![
                        ContentBlock::text("Hel"),
                        ContentBlock::tool_use("t1", "f", serde_json::Value::Null),
                        ContentBlock::text("lo"),
                    ],
                    stop_reason: None,
                },
                ChatChoice {
                    content: vec![ContentBlock::text("other")],
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        assert_eq!(response.text(), "Hello");
        assert!(response.has_content());
        assert!(!ChatResponse::default().has_content());
    }

    #[test]
    fn event_kind_serializes_by_name() {
        let event = ChatEvent::new(EventKind::Other("citation".into()));
        let value = serde_json::to_value(&event).expect("encode");
        assert_eq!(value, serde_json::json!({"kind": "citation"}));
        assert_eq!(EventKind::ToolCallDelta.to_string(), "tool_call_delta");
    }
}

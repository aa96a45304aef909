use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

use crate::content::ContentBlock;
use crate::errors::StreamError;
use crate::stream::{ChatChoice, ChatResponse, ChatUsage, StopReason};
use crate::vendors::null_default;

/// One streamed chat-completion chunk.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    #[serde(default, deserialize_with = "null_default")]
    pub id: String,
    /// Always `chat.completion.chunk`.
    #[serde(default, deserialize_with = "null_default")]
    pub object: String,
    #[serde(default, deserialize_with = "null_default")]
    pub created: i64,
    #[serde(default, deserialize_with = "null_default")]
    pub model: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub service_tier: serde_json::Value,
    #[serde(default, deserialize_with = "null_default")]
    pub system_fingerprint: String,
    #[serde(default, deserialize_with = "null_default")]
    pub choices: Vec<ChunkChoice>,
    /// Present on the final chunk when usage reporting was requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<CompletionUsage>,
    /// Mid-stream failure reported by routers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ChunkError>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkChoice {
    #[serde(default, deserialize_with = "null_default")]
    pub index: usize,
    #[serde(default, deserialize_with = "null_default")]
    pub delta: ChunkDelta,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub finish_reason: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkDelta {
    #[serde(default, deserialize_with = "null_default")]
    pub role: String,
    #[serde(default, deserialize_with = "null_default")]
    pub content: String,
    #[serde(default, deserialize_with = "null_default")]
    pub refusal: String,
    /// Reasoning text, as sent by DeepSeek.
    #[serde(default, deserialize_with = "null_default")]
    pub reasoning_content: String,
    /// Reasoning text, as sent by OpenRouter.
    #[serde(default, deserialize_with = "null_default")]
    pub reasoning: String,
    #[serde(default, deserialize_with = "null_default")]
    pub tool_calls: Vec<ToolCallDelta>,
}

impl ChunkDelta {
    pub(crate) fn reasoning_text(&self) -> String {
        let mut out = self.reasoning_content.clone();
        out.push_str(&self.reasoning);
        out
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    #[serde(default, deserialize_with = "null_default")]
    pub index: usize,
    #[serde(default, deserialize_with = "null_default")]
    pub id: String,
    #[serde(rename = "type", default, deserialize_with = "null_default")]
    pub kind: String,
    #[serde(default, deserialize_with = "null_default")]
    pub function: FunctionCall,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    #[serde(default, deserialize_with = "null_default")]
    pub name: String,
    /// JSON text, possibly partial while streaming.
    #[serde(default, deserialize_with = "null_default")]
    pub arguments: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkError {
    #[serde(rename = "type", default, deserialize_with = "null_default")]
    pub kind: String,
    #[serde(default, deserialize_with = "null_default")]
    pub message: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub code: serde_json::Value,
}

impl ChunkError {
    pub(crate) fn error_type(&self) -> String {
        if !self.kind.is_empty() {
            return self.kind.clone();
        }
        match &self.code {
            serde_json::Value::Null => "api_error".to_string(),
            serde_json::Value::String(code) => code.clone(),
            other => other.to_string(),
        }
    }
}

/// A complete chat completion, or the accumulated state of a streamed one.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletion {
    #[serde(default, deserialize_with = "null_default")]
    pub id: String,
    /// Always `chat.completion` for direct responses.
    #[serde(default, deserialize_with = "null_default")]
    pub object: String,
    #[serde(default, deserialize_with = "null_default")]
    pub created: i64,
    #[serde(default, deserialize_with = "null_default")]
    pub model: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub service_tier: serde_json::Value,
    #[serde(default, deserialize_with = "null_default")]
    pub system_fingerprint: String,
    #[serde(default, deserialize_with = "null_default")]
    pub choices: Vec<ChatCompletionChoice>,
    #[serde(default, deserialize_with = "null_default")]
    pub usage: CompletionUsage,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionChoice {
    #[serde(default, deserialize_with = "null_default")]
    pub index: usize,
    #[serde(default, deserialize_with = "null_default")]
    pub message: ChatCompletionMessage,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub finish_reason: Option<String>,
}

impl ChatCompletionChoice {
    pub fn is_finished(&self) -> bool {
        self.finish_reason.is_some()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionMessage {
    #[serde(default, deserialize_with = "null_default")]
    pub role: String,
    #[serde(default, deserialize_with = "null_default")]
    pub content: String,
    #[serde(default, deserialize_with = "null_default")]
    pub refusal: String,
    #[serde(default, deserialize_with = "null_default")]
    pub reasoning_content: String,
    #[serde(default, deserialize_with = "null_default")]
    pub tool_calls: Vec<ToolCall>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default, deserialize_with = "null_default")]
    pub id: String,
    #[serde(rename = "type", default, deserialize_with = "null_default")]
    pub kind: String,
    #[serde(default, deserialize_with = "null_default")]
    pub function: FunctionCall,
}

impl ChatCompletion {
    /// Converts to the vendor-neutral snapshot.
    ///
    /// Tool-call arguments of finished choices must be valid JSON; arguments of
    /// choices still streaming are reported as `null` until they finish.
    pub fn to_chat_response(&self) -> Result<ChatResponse, StreamError> {
        let mut choices = Vec::with_capacity(self.choices.len());
        for choice in &self.choices {
            let message = &choice.message;
            let mut content = Vec::new();
            if !message.reasoning_content.is_empty() {
                content.push(ContentBlock::Thinking {
                    thinking: message.reasoning_content.clone(),
                    signature: String::new(),
                });
            }
            if !message.content.is_empty() {
                content.push(ContentBlock::text(message.content.clone()));
            }
            for call in &message.tool_calls {
                let input = parse_arguments(&call.function.arguments, choice.is_finished())?;
                content.push(ContentBlock::tool_use(
                    call.id.clone(),
                    call.function.name.clone(),
                    input,
                ));
            }
            choices.push(ChatChoice {
                role: message.role.clone(),
                content,
                stop_reason: choice.finish_reason.as_deref().map(StopReason::from),
            });
        }

        Ok(ChatResponse {
            id: self.id.clone(),
            model: self.model.clone(),
            choices,
            usage: (&self.usage).into(),
        })
    }
}

fn parse_arguments(arguments: &str, strict: bool) -> Result<serde_json::Value, StreamError> {
    if arguments.trim().is_empty() {
        return Ok(serde_json::Value::Object(Default::default()));
    }
    match serde_json::from_str(arguments) {
        Ok(value) => Ok(value),
        Err(e) if strict => Err(StreamError::decode(
            "tool_call arguments",
            e,
            arguments.as_bytes(),
        )),
        Err(_) => Ok(serde_json::Value::Null),
    }
}

/// Token counters; streamed chunks are summed field by field.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionUsage {
    #[serde(default, deserialize_with = "null_default")]
    pub completion_tokens: u64,
    #[serde(default, deserialize_with = "null_default")]
    pub prompt_tokens: u64,
    #[serde(default, deserialize_with = "null_default")]
    pub total_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_tokens_details: Option<CompletionTokensDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_tokens_details: Option<PromptTokensDetails>,
    /// Request cost, reported by OpenRouter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
}

impl CompletionUsage {
    pub fn is_empty(&self) -> bool {
        self.completion_tokens == 0 && self.prompt_tokens == 0 && self.total_tokens == 0
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionTokensDetails {
    #[serde(deserialize_with = "null_default")]
    pub accepted_prediction_tokens: u64,
    #[serde(deserialize_with = "null_default")]
    pub audio_tokens: u64,
    #[serde(deserialize_with = "null_default")]
    pub reasoning_tokens: u64,
    #[serde(deserialize_with = "null_default")]
    pub rejected_prediction_tokens: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptTokensDetails {
    #[serde(deserialize_with = "null_default")]
    pub cached_tokens: u64,
    #[serde(deserialize_with = "null_default")]
    pub audio_tokens: u64,
}

impl AddAssign<&CompletionUsage> for CompletionUsage {
    fn add_assign(&mut self, rhs: &CompletionUsage) {
        self.completion_tokens += rhs.completion_tokens;
        self.prompt_tokens += rhs.prompt_tokens;
        self.total_tokens += rhs.total_tokens;
        if let Some(details) = &rhs.completion_tokens_details {
            let acc = self.completion_tokens_details.get_or_insert_with(Default::default);
            acc.accepted_prediction_tokens += details.accepted_prediction_tokens;
            acc.audio_tokens += details.audio_tokens;
            acc.reasoning_tokens += details.reasoning_tokens;
            acc.rejected_prediction_tokens += details.rejected_prediction_tokens;
        }
        if let Some(details) = &rhs.prompt_tokens_details {
            let acc = self.prompt_tokens_details.get_or_insert_with(Default::default);
            acc.cached_tokens += details.cached_tokens;
            acc.audio_tokens += details.audio_tokens;
        }
        if let Some(cost) = rhs.cost {
            *self.cost.get_or_insert(0.0) += cost;
        }
    }
}

impl From<&CompletionUsage> for ChatUsage {
    fn from(usage: &CompletionUsage) -> Self {
        let completion = usage.completion_tokens_details.clone().unwrap_or_default();
        let prompt = usage.prompt_tokens_details.clone().unwrap_or_default();
        ChatUsage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            output_reasoning_tokens: completion.reasoning_tokens,
            output_audio_tokens: completion.audio_tokens,
            input_audio_tokens: prompt.audio_tokens,
            input_cached_tokens: prompt.cached_tokens,
            input_cache_creation_tokens: 0,
        }
    }
}

/// Treats `null` and `""` finish reasons alike.
fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

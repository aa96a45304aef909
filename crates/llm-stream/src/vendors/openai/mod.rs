//! Chat-completion chunk streams.
//!
//! Shared by every vendor exposing the chat-completions wire shape: records are
//! untyped `data:` chunks addressing choices and tool calls by index, and the
//! stream ends with a `[DONE]` sentinel.
mod accumulator;
mod handler;
mod types;

pub use accumulator::{ChatCompletionAccumulator, ChunkUpdate};
pub use handler::ChatChunkHandler;
pub use types::{
    ChatCompletion, ChatCompletionChoice, ChatCompletionChunk, ChatCompletionMessage,
    ChunkChoice, ChunkDelta, ChunkError, CompletionTokensDetails, CompletionUsage, FunctionCall,
    PromptTokensDetails, ToolCall, ToolCallDelta,
};

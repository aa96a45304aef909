use tracing::trace;

use super::types::{Message, MessageStreamEvent};
use crate::content::{BlockDelta, ContentBlock};
use crate::errors::{InvariantViolation, StreamError, index_out_of_range};
use crate::stream::ChatResponse;

#[derive(Clone, Debug, Default, PartialEq)]
struct BlockState {
    /// Tool input fragments collected until the block stops.
    raw_json: String,
    stopped: bool,
}

/// Folds message stream records into one [`Message`].
///
/// Blocks are appended strictly in order and become immutable once stopped.
/// Nothing but `ping` and `error` is accepted after the message has a stop
/// reason or after `message_stop`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MessageAccumulator {
    message: Message,
    blocks: Vec<BlockState>,
    started: bool,
    stopped: bool,
}

impl MessageAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn into_message(self) -> Message {
        self.message
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Returns `true` once `message_stop` was applied.
    pub fn is_complete(&self) -> bool {
        self.stopped
    }

    pub fn to_chat_response(&self) -> ChatResponse {
        self.message.to_chat_response()
    }

    /// Applies one record.
    pub fn apply(&mut self, event: &MessageStreamEvent) -> Result<(), StreamError> {
        match event {
            MessageStreamEvent::MessageStart { message } => self.start(message),
            MessageStreamEvent::ContentBlockStart {
                index,
                content_block,
            } => {
                self.ensure_open("content_block_start")?;
                let len = self.message.content.len();
                if *index != len {
                    return Err(index_out_of_range("content block", *index, len));
                }
                self.message.content.push(content_block.clone());
                self.blocks.push(BlockState::default());
                Ok(())
            }
            MessageStreamEvent::ContentBlockDelta { index, delta } => {
                self.ensure_open("content_block_delta")?;
                let index = self.open_block(*index, "content_block_delta")?;
                self.merge_delta(index, delta)
            }
            MessageStreamEvent::ContentBlockStop { index } => {
                self.ensure_open("content_block_stop")?;
                let index = self.open_block(*index, "content_block_stop")?;
                self.finish_block(index)
            }
            MessageStreamEvent::MessageDelta { delta, usage } => {
                self.ensure_open("message_delta")?;
                if delta.stop_reason.is_some() {
                    self.message.stop_reason = delta.stop_reason.clone();
                }
                if delta.stop_sequence.is_some() {
                    self.message.stop_sequence = delta.stop_sequence.clone();
                }
                self.message.usage.output_tokens = usage.output_tokens;
                if let Some(tokens) = usage.input_tokens {
                    self.message.usage.input_tokens = tokens;
                }
                if let Some(tokens) = usage.cache_creation_input_tokens {
                    self.message.usage.cache_creation_input_tokens = tokens;
                }
                if let Some(tokens) = usage.cache_read_input_tokens {
                    self.message.usage.cache_read_input_tokens = tokens;
                }
                Ok(())
            }
            MessageStreamEvent::MessageStop => {
                if !self.started {
                    return Err(InvariantViolation::NotStarted("message_stop".into()).into());
                }
                if self.stopped {
                    return Err(InvariantViolation::TerminalMutation("message_stop".into()).into());
                }
                self.stopped = true;
                Ok(())
            }
            MessageStreamEvent::Ping
            | MessageStreamEvent::Error { .. }
            | MessageStreamEvent::Other { .. } => Ok(()),
        }
    }

    fn start(&mut self, message: &Message) -> Result<(), StreamError> {
        if self.started {
            check_identity("message id", &self.message.id, &message.id)?;
            check_identity("model", &self.message.model, &message.model)?;
            trace!(id = %message.id, "repeated message_start ignored");
            return Ok(());
        }
        self.message = message.clone();
        // Content delivered with the start record is already complete.
        self.blocks = vec![
            BlockState {
                raw_json: String::new(),
                stopped: true,
            };
            message.content.len()
        ];
        self.started = true;
        Ok(())
    }

    fn ensure_open(&self, record: &str) -> Result<(), StreamError> {
        if !self.started {
            return Err(InvariantViolation::NotStarted(record.into()).into());
        }
        if self.stopped || self.message.stop_reason.is_some() {
            return Err(InvariantViolation::TerminalMutation(record.into()).into());
        }
        Ok(())
    }

    fn open_block(&self, index: usize, record: &str) -> Result<usize, StreamError> {
        let Some(state) = self.blocks.get(index) else {
            return Err(index_out_of_range("content block", index, self.blocks.len()));
        };
        if state.stopped {
            return Err(
                InvariantViolation::TerminalMutation(format!("{record} for block {index}")).into(),
            );
        }
        Ok(index)
    }

    fn merge_delta(&mut self, index: usize, delta: &BlockDelta) -> Result<(), StreamError> {
        let state = &mut self.blocks[index];
        let block = &mut self.message.content[index];
        match (block, delta) {
            (ContentBlock::Text { text }, BlockDelta::TextDelta { text: more }) => {
                text.push_str(more);
            }
            (ContentBlock::ToolUse { .. }, BlockDelta::InputJsonDelta { partial_json }) => {
                state.raw_json.push_str(partial_json);
            }
            (ContentBlock::Thinking { thinking, .. }, BlockDelta::ThinkingDelta { thinking: more }) => {
                thinking.push_str(more);
            }
            (ContentBlock::Thinking { signature, .. }, BlockDelta::SignatureDelta { signature: sig }) => {
                *signature = sig.clone();
            }
            (_, BlockDelta::Unsupported) => {
                trace!(index, "unsupported block delta ignored");
            }
            (ContentBlock::Unsupported, delta) => {
                trace!(index, delta = delta.kind(), "delta for unsupported block ignored");
            }
            (block, delta) => {
                return Err(InvariantViolation::DeltaMismatch {
                    index,
                    block: block.kind(),
                    delta: delta.kind(),
                }
                .into());
            }
        }
        Ok(())
    }

    fn finish_block(&mut self, index: usize) -> Result<(), StreamError> {
        let state = &mut self.blocks[index];
        if let ContentBlock::ToolUse { input, .. } = &mut self.message.content[index]
            && !state.raw_json.is_empty()
        {
            *input = serde_json::from_str(&state.raw_json).map_err(|e| {
                StreamError::decode("content_block_stop", e, state.raw_json.as_bytes())
            })?;
        }
        state.stopped = true;
        Ok(())
    }
}

fn check_identity(field: &'static str, expected: &str, actual: &str) -> Result<(), StreamError> {
    if expected != actual {
        return Err(InvariantViolation::IdentityMismatch {
            field,
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
        .into());
    }
    Ok(())
}

use tracing::{debug, trace};

use super::accumulator::{ChatCompletionAccumulator, ChunkUpdate};
use super::types::ChatCompletionChunk;
use crate::errors::StreamError;
use crate::pipeline::Handler;
use crate::stream::{ChatEvent, EventDelta, EventKind};

/// Accumulates chat-completion chunks and emits one [`ChatEvent`] per chunk.
///
/// The stream has no explicit stop record, so [`EventKind::MessageStop`] is
/// emitted the first time every choice has finished, or when a content-free
/// usage or choice-less chunk follows content. Later usage chunks become
/// [`EventKind::MessageDelta`] with the updated snapshot.
#[derive(Debug)]
pub struct ChatChunkHandler {
    accumulator: ChatCompletionAccumulator,
    started: bool,
    saw_content: bool,
    stopped: bool,
    terminal_error: Option<StreamError>,
}

impl Default for ChatChunkHandler {
    fn default() -> Self {
        Self::from_accumulator(ChatCompletionAccumulator::default())
    }
}

impl ChatChunkHandler {
    /// `max_index` bounds choice and tool-call indices.
    pub fn new(max_index: usize) -> Self {
        Self::from_accumulator(ChatCompletionAccumulator::new(max_index))
    }

    fn from_accumulator(accumulator: ChatCompletionAccumulator) -> Self {
        Self {
            accumulator,
            started: false,
            saw_content: false,
            stopped: false,
            terminal_error: None,
        }
    }

    pub fn accumulator(&self) -> &ChatCompletionAccumulator {
        &self.accumulator
    }

    fn classify(&mut self, chunk: &ChatCompletionChunk, update: ChunkUpdate) -> Result<ChatEvent, StreamError> {
        let usage_chunk = chunk.usage.as_ref().is_some_and(|u| !u.is_empty());
        let has_content = update.has_content();
        // Usage may ride on every chunk; only a content-free one can close the message.
        let trailing = self.saw_content && !has_content && (usage_chunk || chunk.choices.is_empty());

        if !self.stopped && (self.accumulator.all_finished() || trailing) {
            self.stopped = true;
            let message = self.accumulator.to_chat_response()?;
            debug!(
                id = %message.id,
                stop_reason = ?message.stop_reason(),
                output_tokens = message.usage.output_tokens,
                "completion stopped"
            );
            // The finishing chunk's own fragment rides on the stop event.
            let mut event = ChatEvent::new(EventKind::MessageStop).with_message(message);
            if let Some((_, delta)) = content_delta(update) {
                event = event.with_delta(delta);
            }
            return Ok(event);
        }

        let event = if let Some((kind, delta)) = content_delta(update) {
            ChatEvent::new(kind).with_delta(delta)
        } else if self.stopped && usage_chunk {
            ChatEvent::new(EventKind::MessageDelta).with_message(self.accumulator.to_chat_response()?)
        } else if !self.started {
            debug!(id = %chunk.id, model = %chunk.model, "completion started");
            ChatEvent::new(EventKind::MessageStart)
        } else {
            ChatEvent::new(EventKind::MessageDelta)
        };
        Ok(event)
    }
}

fn content_delta(update: ChunkUpdate) -> Option<(EventKind, EventDelta)> {
    if !update.text.is_empty() {
        Some((EventKind::TextDelta, EventDelta::Text(update.text)))
    } else if !update.reasoning.is_empty() {
        Some((EventKind::ThinkingDelta, EventDelta::Text(update.reasoning)))
    } else if !update.tool_calls.is_empty() {
        Some((EventKind::ToolCallDelta, EventDelta::ToolCalls(update.tool_calls)))
    } else {
        None
    }
}

impl Handler<ChatCompletionChunk> for ChatChunkHandler {
    type Output = ChatEvent;

    fn should_continue(&self, _chunk: &ChatCompletionChunk) -> bool {
        true
    }

    fn handle_event(&mut self, chunk: &ChatCompletionChunk) -> Result<ChatEvent, StreamError> {
        trace!(id = %chunk.id, choices = chunk.choices.len(), "chat completion chunk");

        if let Some(error) = &chunk.error {
            let error_type = error.error_type();
            debug!(error_type = %error_type, error_message = %error.message, "vendor error chunk");
            self.terminal_error = Some(StreamError::protocol(error_type, error.message.clone()));
            let mut event =
                ChatEvent::new(EventKind::Error).with_delta(EventDelta::Text(error.message.clone()));
            if let Ok(message) = self.accumulator.to_chat_response() {
                event = event.with_message(message);
            }
            return Ok(event);
        }

        let update = self.accumulator.apply(chunk)?;
        let has_content = update.has_content();
        let event = self.classify(chunk, update)?;
        self.saw_content |= has_content;
        self.started = true;
        Ok(event)
    }

    fn take_terminal_error(&mut self) -> Option<StreamError> {
        self.terminal_error.take()
    }
}

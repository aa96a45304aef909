use tracing::{debug, trace};

use super::accumulator::MessageAccumulator;
use super::types::MessageStreamEvent;
use crate::content::{BlockDelta, ContentBlock};
use crate::decoder::RawEvent;
use crate::errors::StreamError;
use crate::pipeline::{Handler, is_done_sentinel};
use crate::stream::{ChatEvent, EventDelta, EventKind, ToolCallFragment};

/// Decodes raw records into [`MessageStreamEvent`]s.
#[derive(Debug, Default)]
pub struct AnthropicRecordHandler;

impl AnthropicRecordHandler {
    pub fn new() -> Self {
        Self
    }
}

impl Handler<RawEvent> for AnthropicRecordHandler {
    type Output = MessageStreamEvent;

    fn should_continue(&self, event: &RawEvent) -> bool {
        !is_done_sentinel(&event.data)
    }

    fn handle_event(&mut self, event: &RawEvent) -> Result<MessageStreamEvent, StreamError> {
        MessageStreamEvent::decode(&event.event_type, &event.data)
    }
}

/// Accumulates message records and emits one [`ChatEvent`] per record.
///
/// An `error` record is delivered as [`EventKind::Error`] and then ends the
/// stream with [`StreamError::Protocol`].
#[derive(Debug, Default)]
pub struct AnthropicEventHandler {
    accumulator: MessageAccumulator,
    terminal_error: Option<StreamError>,
}

impl AnthropicEventHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accumulator(&self) -> &MessageAccumulator {
        &self.accumulator
    }
}

impl Handler<MessageStreamEvent> for AnthropicEventHandler {
    type Output = ChatEvent;

    fn should_continue(&self, _event: &MessageStreamEvent) -> bool {
        true
    }

    fn handle_event(&mut self, event: &MessageStreamEvent) -> Result<ChatEvent, StreamError> {
        trace!(event_type = event.event_type(), "anthropic record");
        self.accumulator.apply(event)?;

        let chat_event = match event {
            MessageStreamEvent::MessageStart { message } => {
                debug!(id = %message.id, model = %message.model, "message started");
                ChatEvent::new(EventKind::MessageStart)
            }
            MessageStreamEvent::ContentBlockStart { content_block, .. } => {
                block_event(EventKind::ContentBlockStart, content_block)
            }
            MessageStreamEvent::ContentBlockDelta { index, delta } => self.delta_event(*index, delta),
            MessageStreamEvent::ContentBlockStop { index } => {
                match self.accumulator.message().content.get(*index) {
                    Some(block) => block_event(EventKind::ContentBlockStop, block),
                    None => ChatEvent::new(EventKind::ContentBlockStop),
                }
            }
            MessageStreamEvent::MessageDelta { delta, usage } => {
                let mut event = ChatEvent::new(EventKind::MessageDelta)
                    .with_message(self.accumulator.to_chat_response());
                let payload = serde_json::to_value(delta).and_then(|delta| {
                    serde_json::to_value(usage)
                        .map(|usage| serde_json::json!({"delta": delta, "usage": usage}))
                });
                if let Ok(value) = payload {
                    event = event.with_delta(EventDelta::Json(value));
                }
                event
            }
            MessageStreamEvent::MessageStop => {
                let message = self.accumulator.to_chat_response();
                debug!(
                    id = %message.id,
                    stop_reason = ?message.stop_reason(),
                    output_tokens = message.usage.output_tokens,
                    "message stopped"
                );
                ChatEvent::new(EventKind::MessageStop).with_message(message)
            }
            MessageStreamEvent::Ping => ChatEvent::new(EventKind::Ping),
            MessageStreamEvent::Error { error } => {
                debug!(error_type = %error.kind, error_message = %error.message, "vendor error record");
                self.terminal_error = Some(StreamError::protocol(&error.kind, &error.message));
                ChatEvent::new(EventKind::Error)
                    .with_delta(EventDelta::Text(error.message.clone()))
                    .with_message(self.accumulator.to_chat_response())
            }
            MessageStreamEvent::Other {
                event_type,
                payload,
            } => ChatEvent::new(EventKind::Other(event_type.clone()))
                .with_delta(EventDelta::Json(payload.clone())),
        };
        Ok(chat_event)
    }

    fn take_terminal_error(&mut self) -> Option<StreamError> {
        self.terminal_error.take()
    }
}

impl AnthropicEventHandler {
    fn delta_event(&self, index: usize, delta: &BlockDelta) -> ChatEvent {
        match delta {
            BlockDelta::TextDelta { text } if !text.is_empty() => {
                ChatEvent::new(EventKind::TextDelta).with_delta(EventDelta::Text(text.clone()))
            }
            BlockDelta::ThinkingDelta { thinking } => ChatEvent::new(EventKind::ThinkingDelta)
                .with_delta(EventDelta::Text(thinking.clone())),
            BlockDelta::InputJsonDelta { partial_json } => {
                match self.accumulator.message().content.get(index) {
                    Some(ContentBlock::ToolUse { id, name, .. }) => {
                        ChatEvent::new(EventKind::ToolCallDelta).with_delta(EventDelta::ToolCalls(
                            vec![ToolCallFragment {
                                choice: 0,
                                index,
                                id: Some(id.clone()),
                                name: Some(name.clone()),
                                arguments: partial_json.clone(),
                            }],
                        ))
                    }
                    // Server-side tool blocks stream input too; not a client tool call.
                    _ => json_delta_event(delta),
                }
            }
            other => json_delta_event(other),
        }
    }
}

fn json_delta_event(delta: &BlockDelta) -> ChatEvent {
    let event = ChatEvent::new(EventKind::ContentBlockDelta);
    match serde_json::to_value(delta) {
        Ok(value) => event.with_delta(EventDelta::Json(value)),
        Err(_) => event,
    }
}

fn block_event(kind: EventKind, block: &ContentBlock) -> ChatEvent {
    let event = ChatEvent::new(kind);
    match serde_json::to_value(block) {
        Ok(value) => event.with_delta(EventDelta::Json(value)),
        Err(_) => event,
    }
}

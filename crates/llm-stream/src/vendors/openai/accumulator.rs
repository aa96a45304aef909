use tracing::warn;

use super::types::{ChatCompletion, ChatCompletionChoice, ChatCompletionChunk, ToolCall};
use crate::errors::{InvariantViolation, StreamError, index_out_of_range};
use crate::stream::{ChatResponse, ToolCallFragment};

/// What one chunk contributed to the accumulated completion.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChunkUpdate {
    /// Content text merged from this chunk, in choice order.
    pub text: String,
    /// Reasoning text merged from this chunk.
    pub reasoning: String,
    /// Tool-call fragments merged from this chunk.
    pub tool_calls: Vec<ToolCallFragment>,
    /// Choices that received their finish reason in this chunk.
    pub finished: Vec<usize>,
    /// Choice deltas dropped because their choice had already finished.
    pub ignored: usize,
}

impl ChunkUpdate {
    pub fn has_content(&self) -> bool {
        !self.text.is_empty() || !self.reasoning.is_empty() || !self.tool_calls.is_empty()
    }
}

/// Folds chat-completion chunks into one [`ChatCompletion`].
///
/// Choice and tool-call arrays grow to whatever index a chunk addresses, up to
/// `max_index`. A choice stops changing once its finish reason is set.
#[derive(Clone, Debug, PartialEq)]
pub struct ChatCompletionAccumulator {
    completion: ChatCompletion,
    max_index: usize,
}

impl Default for ChatCompletionAccumulator {
    fn default() -> Self {
        Self::new(crate::config::StreamConfig::default().max_index)
    }
}

impl ChatCompletionAccumulator {
    pub fn new(max_index: usize) -> Self {
        Self {
            completion: ChatCompletion::default(),
            max_index,
        }
    }

    pub fn completion(&self) -> &ChatCompletion {
        &self.completion
    }

    pub fn into_completion(self) -> ChatCompletion {
        self.completion
    }

    /// Returns `true` when at least one choice exists and every choice finished.
    pub fn all_finished(&self) -> bool {
        !self.completion.choices.is_empty()
            && self
                .completion
                .choices
                .iter()
                .all(ChatCompletionChoice::is_finished)
    }

    pub fn to_chat_response(&self) -> Result<ChatResponse, StreamError> {
        self.completion.to_chat_response()
    }

    /// Applies one chunk. A rejected chunk leaves the state untouched.
    pub fn apply(&mut self, chunk: &ChatCompletionChunk) -> Result<ChunkUpdate, StreamError> {
        self.check_chunk(chunk)?;

        let completion = &mut self.completion;
        if completion.id.is_empty() && !chunk.id.is_empty() {
            completion.id = chunk.id.clone();
            completion.object = chunk.object.clone();
            completion.created = chunk.created;
            completion.model = chunk.model.clone();
            completion.service_tier = chunk.service_tier.clone();
            completion.system_fingerprint = chunk.system_fingerprint.clone();
        }
        if let Some(usage) = &chunk.usage {
            completion.usage += usage;
        }

        let mut update = ChunkUpdate::default();
        for delta_choice in &chunk.choices {
            let index = delta_choice.index;
            if completion.choices.len() <= index {
                let start = completion.choices.len();
                completion
                    .choices
                    .extend((start..=index).map(|i| ChatCompletionChoice {
                        index: i,
                        ..Default::default()
                    }));
            }
            let choice = &mut completion.choices[index];
            if choice.is_finished() {
                warn!(
                    id = %completion.id,
                    index,
                    "delta for finished choice ignored"
                );
                update.ignored += 1;
                continue;
            }

            let delta = &delta_choice.delta;
            let message = &mut choice.message;
            if message.role.is_empty() && !delta.role.is_empty() {
                message.role = delta.role.clone();
            }
            message.content.push_str(&delta.content);
            message.refusal.push_str(&delta.refusal);
            let reasoning = delta.reasoning_text();
            message.reasoning_content.push_str(&reasoning);
            update.text.push_str(&delta.content);
            update.reasoning.push_str(&reasoning);

            if let Some(reason) = &delta_choice.finish_reason {
                choice.finish_reason = Some(reason.clone());
                update.finished.push(index);
                // Fragments riding on the finishing delta would corrupt arguments.
                continue;
            }

            for tool_delta in &delta.tool_calls {
                let calls = &mut message.tool_calls;
                if calls.len() <= tool_delta.index {
                    calls.resize_with(tool_delta.index + 1, ToolCall::default);
                }
                let call = &mut calls[tool_delta.index];
                if call.id.is_empty() {
                    call.id = tool_delta.id.clone();
                }
                if call.kind.is_empty() {
                    call.kind = tool_delta.kind.clone();
                }
                if !tool_delta.function.name.is_empty() {
                    call.function.name = tool_delta.function.name.clone();
                }
                call.function.arguments.push_str(&tool_delta.function.arguments);
                update.tool_calls.push(ToolCallFragment {
                    choice: index,
                    index: tool_delta.index,
                    id: non_empty(&tool_delta.id),
                    name: non_empty(&tool_delta.function.name),
                    arguments: tool_delta.function.arguments.clone(),
                });
            }
        }
        Ok(update)
    }

    fn check_chunk(&self, chunk: &ChatCompletionChunk) -> Result<(), StreamError> {
        if !self.completion.id.is_empty()
            && !chunk.id.is_empty()
            && chunk.id != self.completion.id
        {
            return Err(InvariantViolation::IdentityMismatch {
                field: "completion id",
                expected: self.completion.id.clone(),
                actual: chunk.id.clone(),
            }
            .into());
        }
        for choice in &chunk.choices {
            if choice.index > self.max_index {
                return Err(index_out_of_range("choice", choice.index, self.max_index));
            }
            for call in &choice.delta.tool_calls {
                if call.index > self.max_index {
                    return Err(index_out_of_range("tool call", call.index, self.max_index));
                }
            }
        }
        Ok(())
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ContentBlock;
    use crate::stream::StopReason;
    use crate::vendors::openai::types::{ChunkChoice, ChunkDelta, FunctionCall, ToolCallDelta};

    fn chunk(index: usize, delta: ChunkDelta, finish: Option<&str>) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: "c1".into(),
            model: "gpt".into(),
            choices: vec![ChunkChoice {
                index,
                delta,
                finish_reason: finish.map(str::to_string),
            }],
            ..Default::default()
        }
    }

    fn text(content: &str) -> ChunkDelta {
        ChunkDelta {
            content: content.into(),
            ..Default::default()
        }
    }

    fn tool(index: usize, id: &str, name: &str, arguments: &str) -> ChunkDelta {
        ChunkDelta {
            tool_calls: vec![ToolCallDelta {
                index,
                id: id.into(),
                kind: if id.is_empty() { String::new() } else { "function".into() },
                function: FunctionCall {
                    name: name.into(),
                    arguments: arguments.into(),
                },
            }],
            ..Default::default()
        }
    }

    fn replay(chunks: &[ChatCompletionChunk]) -> ChatCompletionAccumulator {
        let mut acc = ChatCompletionAccumulator::default();
        for c in chunks {
            acc.apply(c).expect("apply");
        }
        acc
    }

    #[test]
    fn text_merges_through_the_finishing_delta() {
        let acc = replay(&[
            chunk(0, text("Hel"), None),
            chunk(0, text("lo"), Some("stop")),
        ]);
        let response = acc.to_chat_response().expect("snapshot");
        assert_eq!(response.text(), "Hello");
        assert_eq!(response.stop_reason(), Some(&StopReason::EndTurn));
        assert!(acc.all_finished());
    }

    #[test]
    fn finished_choice_is_left_untouched() {
        let mut acc = replay(&[chunk(0, text("done"), Some("stop"))]);
        let before = acc.completion().clone();
        let update = acc
            .apply(&chunk(0, text(" more"), None))
            .expect("ignored, not fatal");
        assert_eq!(update.ignored, 1);
        assert!(update.text.is_empty());
        assert_eq!(acc.completion(), &before);

        let update = acc.apply(&chunk(0, text(" again"), Some("length"))).expect("ignored");
        assert_eq!(update.ignored, 1);
        assert_eq!(acc.completion(), &before);
    }

    #[test]
    fn tool_arguments_concatenate_and_parse_after_finish() {
        let acc = replay(&[
            chunk(0, tool(0, "call_1", "get_weather", ""), None),
            chunk(0, tool(0, "", "", "{\"a\":1"), None),
            chunk(0, tool(0, "", "", "}"), None),
            chunk(0, ChunkDelta::default(), Some("tool_calls")),
        ]);
        let call = &acc.completion().choices[0].message.tool_calls[0];
        assert_eq!(call.id, "call_1");
        assert_eq!(call.kind, "function");
        assert_eq!(call.function.arguments, "{\"a\":1}");
        let response = acc.to_chat_response().expect("snapshot");
        assert_eq!(
            response.choices[0].content,
            vec![ContentBlock::tool_use(
                "call_1",
                "get_weather",
                serde_json::json!({"a": 1})
            )]
        );
    }

    #[test]
    fn fragments_on_the_finishing_delta_are_dropped() {
        let acc = replay(&[
            chunk(0, tool(0, "call_1", "f", "{}"), None),
            chunk(0, tool(0, "", "", "garbage"), Some("tool_calls")),
        ]);
        assert_eq!(
            acc.completion().choices[0].message.tool_calls[0].function.arguments,
            "{}"
        );
    }

    #[test]
    fn sparse_indices_grow_within_the_ceiling() {
        let mut acc = ChatCompletionAccumulator::new(4);
        let update = acc.apply(&chunk(2, text("x"), None)).expect("grow");
        assert_eq!(update.text, "x");
        assert_eq!(acc.completion().choices.len(), 3);
        assert_eq!(acc.completion().choices[1].index, 1);
        assert!(!acc.all_finished());

        acc.apply(&chunk(0, tool(4, "call_9", "f", "{}"), None))
            .expect("tool index at ceiling");
        assert_eq!(acc.completion().choices[0].message.tool_calls.len(), 5);

        let before = acc.clone();
        let err = acc.apply(&chunk(5, text("y"), None)).expect_err("above ceiling");
        assert_eq!(err, index_out_of_range("choice", 5, 4));
        let err = acc
            .apply(&chunk(0, tool(5, "call_x", "f", ""), None))
            .expect_err("tool above ceiling");
        assert!(err.is_invariant());
        assert_eq!(acc, before);
    }

    #[test]
    fn different_chunk_id_is_fatal() {
        let mut acc = replay(&[chunk(0, text("a"), None)]);
        let mut other = chunk(0, text("b"), None);
        other.id = "c2".into();
        let err = acc.apply(&other).expect_err("identity");
        assert!(matches!(
            err,
            StreamError::Invariant(InvariantViolation::IdentityMismatch { .. })
        ));

        let mut anonymous = chunk(0, text("c"), None);
        anonymous.id = String::new();
        acc.apply(&anonymous).expect("empty id is accepted");
        assert_eq!(acc.completion().choices[0].message.content, "ac");
    }

    #[test]
    fn replay_is_deterministic() {
        let chunks = vec![
            chunk(0, ChunkDelta { role: "assistant".into(), ..Default::default() }, None),
            chunk(1, text("b"), None),
            chunk(0, tool(0, "call_1", "f", "{\"x\""), None),
            chunk(0, tool(0, "", "", ":2}"), None),
            chunk(0, ChunkDelta::default(), Some("tool_calls")),
            chunk(1, text("!"), Some("stop")),
        ];
        assert_eq!(replay(&chunks), replay(&chunks));
        assert!(replay(&chunks).all_finished());
    }

    #[test]
    fn role_is_set_once() {
        let acc = replay(&[
            chunk(0, ChunkDelta { role: "assistant".into(), ..Default::default() }, None),
            chunk(0, ChunkDelta { role: "tool".into(), ..Default::default() }, None),
        ]);
        assert_eq!(acc.completion().choices[0].message.role, "assistant");
    }
}

/// Accumulation invariant violations.
///
/// These indicate an impossible message state rather than a bad network, so
/// they are reported separately from transport and decode failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    /// A positional index addressed memory outside the vendor's policy.
    #[error("{target} index {index} out of range (limit {limit})")]
    IndexOutOfRange {
        target: &'static str,
        index: usize,
        limit: usize,
    },
    /// An identity field changed after stream start.
    #[error("{field} changed mid-stream: expected {expected:?}, got {actual:?}")]
    IdentityMismatch {
        field: &'static str,
        expected: String,
        actual: String,
    },
    /// Content was mutated after its terminal event.
    #[error("{0} after terminal event")]
    TerminalMutation(String),
    /// A content event arrived before the message was started.
    #[error("{0} before message_start")]
    NotStarted(String),
    /// A delta does not fit the block it addresses.
    #[error("content block {index} is {block}, cannot apply {delta}")]
    DeltaMismatch {
        index: usize,
        block: &'static str,
        delta: &'static str,
    },
}

/// Errors surfaced by decoders, pipelines and the relay.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// Underlying read failed or the event-stream framing was broken.
    #[error("transport error: {message}")]
    Transport { message: String },
    /// A record payload did not match the expected vendor shape.
    #[error("decode error ({context}): {message}")]
    Decode {
        context: String,
        message: String,
        /// Offending payload, kept for diagnosis.
        raw: String,
    },
    /// The vendor sent an error record. The text is the vendor message.
    #[error("{message}")]
    Protocol { error_type: String, message: String },
    /// The accumulator reached an impossible state.
    #[error("invariant violation: {0}")]
    Invariant(#[from] InvariantViolation),
    /// The caller cancelled the stream.
    #[error("stream cancelled")]
    Cancelled,
    /// Invalid configuration or registry setup.
    #[error("config error: {0}")]
    Config(String),
    /// The relay task ended abnormally.
    #[error("relay task failed: {0}")]
    Relay(String),
}

impl StreamError {
    /// Creates a transport-level error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates a decode error and attaches the raw payload.
    pub fn decode(context: impl Into<String>, err: impl std::fmt::Display, raw: &[u8]) -> Self {
        Self::Decode {
            context: context.into(),
            message: err.to_string(),
            raw: String::from_utf8_lossy(raw).into_owned(),
        }
    }

    /// Creates a protocol error from a vendor error record.
    pub fn protocol(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Protocol {
            error_type: error_type.into(),
            message: message.into(),
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode { .. })
    }

    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol { .. })
    }

    pub fn is_invariant(&self) -> bool {
        matches!(self, Self::Invariant(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub(crate) fn index_out_of_range(target: &'static str, index: usize, limit: usize) -> StreamError {
    InvariantViolation::IndexOutOfRange {
        target,
        index,
        limit,
    }
    .into()
}

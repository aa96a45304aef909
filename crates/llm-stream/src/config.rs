use crate::errors::StreamError;

const DEFAULT_CHANNEL_CAPACITY: usize = 128;
const DEFAULT_MAX_INDEX: usize = 256;
const DEFAULT_MAX_LINE_BYTES: usize = 4 * 1024 * 1024;

/// Limits and buffer sizes shared by decoders, accumulators and the relay.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamConfig {
    /// Bounded buffer between the relay task and the consumer.
    pub channel_capacity: usize,
    /// Highest choice or tool-call index a sparse accumulator will grow to.
    pub max_index: usize,
    /// Longest event-stream line accepted before the body is treated as broken.
    pub max_line_bytes: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            max_index: DEFAULT_MAX_INDEX,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}

impl StreamConfig {
    /// Builds a config from defaults overridden by `LLM_STREAM_*` variables.
    ///
    /// - `LLM_STREAM_CHANNEL_CAPACITY`
    /// - `LLM_STREAM_MAX_INDEX`
    /// - `LLM_STREAM_MAX_LINE_BYTES`
    pub fn from_env() -> Result<Self, StreamError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`StreamConfig::from_env`] with variables resolved by `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, StreamError> {
        let read = |key: &str| match lookup(key) {
            Some(raw) => parse_usize(key, &raw),
            None => Ok(None),
        };
        let mut config = Self::default();
        if let Some(value) = read("LLM_STREAM_CHANNEL_CAPACITY")? {
            config.channel_capacity = value;
        }
        if let Some(value) = read("LLM_STREAM_MAX_INDEX")? {
            config.max_index = value;
        }
        if let Some(value) = read("LLM_STREAM_MAX_LINE_BYTES")? {
            config.max_line_bytes = value;
        }
        config.validate()?;
        Ok(config)
    }

    /// Overrides the relay channel capacity.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Overrides the sparse index ceiling.
    pub fn max_index(mut self, max_index: usize) -> Self {
        self.max_index = max_index;
        self
    }

    /// Overrides the maximum line length.
    pub fn max_line_bytes(mut self, max_line_bytes: usize) -> Self {
        self.max_line_bytes = max_line_bytes;
        self
    }

    pub fn validate(&self) -> Result<(), StreamError> {
        if self.channel_capacity == 0 {
            return Err(StreamError::Config(
                "channel_capacity must be greater than 0".into(),
            ));
        }
        if self.max_line_bytes == 0 {
            return Err(StreamError::Config(
                "max_line_bytes must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

fn parse_usize(key: &str, raw: &str) -> Result<Option<usize>, StreamError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<usize>()
        .map(Some)
        .map_err(|e| StreamError::Config(format!("invalid {key}={raw:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = StreamConfig::default();
        assert_eq!(config.channel_capacity, 128);
        assert_eq!(config.max_index, 256);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let err = StreamConfig::default().channel_capacity(0).validate();
        assert!(matches!(err, Err(StreamError::Config(msg)) if msg.contains("channel_capacity")));
    }

    #[test]
    fn setters_override_defaults() {
        let config = StreamConfig::default()
            .max_index(8)
            .max_line_bytes(64)
            .channel_capacity(4);
        assert_eq!(config.max_index, 8);
        assert_eq!(config.max_line_bytes, 64);
        assert_eq!(config.channel_capacity, 4);
    }

    #[test]
    fn variables_override_defaults() {
        let config = StreamConfig::from_lookup(lookup(&[
            ("LLM_STREAM_CHANNEL_CAPACITY", "16"),
            ("LLM_STREAM_MAX_INDEX", " 32 "),
            ("LLM_STREAM_MAX_LINE_BYTES", "65536"),
        ]))
        .expect("config");
        assert_eq!(config.channel_capacity, 16);
        assert_eq!(config.max_index, 32);
        assert_eq!(config.max_line_bytes, 65536);
    }

    #[test]
    fn missing_or_blank_variables_keep_defaults() {
        let config = StreamConfig::from_lookup(lookup(&[("LLM_STREAM_MAX_INDEX", "  ")]))
            .expect("config");
        assert_eq!(config, StreamConfig::default());
    }

    #[test]
    fn unparsable_variable_is_a_config_error() {
        let err = StreamConfig::from_lookup(lookup(&[("LLM_STREAM_MAX_INDEX", "lots")]))
            .expect_err("invalid");
        assert!(matches!(&err, StreamError::Config(msg) if msg.contains("LLM_STREAM_MAX_INDEX")));
    }

    #[test]
    fn zero_capacity_from_environment_is_rejected() {
        let err = StreamConfig::from_lookup(lookup(&[("LLM_STREAM_CHANNEL_CAPACITY", "0")]))
            .expect_err("invalid");
        assert!(matches!(&err, StreamError::Config(msg) if msg.contains("channel_capacity")));
    }
}

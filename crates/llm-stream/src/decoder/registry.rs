use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::{
    BoxDecoder, EventStreamDecoder, JsonLinesDecoder, NDJSON_CONTENT_TYPE, RawEvent,
    ResponseBody, normalize_content_type,
};
use crate::config::StreamConfig;
use crate::errors::StreamError;

/// Builds a wire decoder for one response body.
pub type DecoderFactory =
    Arc<dyn Fn(ResponseBody, &StreamConfig) -> BoxDecoder<RawEvent> + Send + Sync>;

/// Maps response content types to specialized decoders.
///
/// Constructed once and handed to whatever assembles stream pipelines. Bodies
/// whose content type has no registration use [`EventStreamDecoder`].
#[derive(Clone)]
pub struct DecoderRegistry {
    config: StreamConfig,
    factories: HashMap<String, DecoderFactory>,
}

impl Default for DecoderRegistry {
    fn default() -> Self {
        Self::with_defaults(StreamConfig::default())
    }
}

impl DecoderRegistry {
    /// Empty registry: every body goes through the event-stream decoder.
    pub fn new(config: StreamConfig) -> Self {
        Self {
            config,
            factories: HashMap::new(),
        }
    }

    /// Registry with the built-in JSON-lines decoder registered.
    pub fn with_defaults(config: StreamConfig) -> Self {
        let mut registry = Self::new(config);
        registry.factories.insert(
            NDJSON_CONTENT_TYPE.to_string(),
            Arc::new(|body: ResponseBody, config: &StreamConfig| {
                Box::new(JsonLinesDecoder::new(body, config.max_line_bytes)) as BoxDecoder<RawEvent>
            }),
        );
        registry
    }

    /// Registers a decoder factory for a content type.
    ///
    /// Content types are matched case-insensitively without parameters.
    /// Registering the same content type twice is rejected.
    pub fn register(
        &mut self,
        content_type: &str,
        factory: impl Fn(ResponseBody, &StreamConfig) -> BoxDecoder<RawEvent> + Send + Sync + 'static,
    ) -> Result<(), StreamError> {
        let key = normalize_content_type(content_type);
        if key.is_empty() {
            return Err(StreamError::Config(
                "decoder content type must not be empty".into(),
            ));
        }
        if self.factories.contains_key(&key) {
            return Err(StreamError::Config(format!(
                "duplicate decoder registration: {key}"
            )));
        }
        self.factories.insert(key, Arc::new(factory));
        Ok(())
    }

    /// Returns `true` when a specialized decoder exists for the content type.
    pub fn is_registered(&self, content_type: &str) -> bool {
        self.factories
            .contains_key(&normalize_content_type(content_type))
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Selects and builds the decoder for a response body.
    pub fn decoder_for(&self, body: ResponseBody) -> BoxDecoder<RawEvent> {
        let key = body.content_type().map(normalize_content_type);
        match key.as_deref().and_then(|k| self.factories.get(k)) {
            Some(factory) => {
                debug!(content_type = ?key, "using registered decoder");
                factory(body, &self.config)
            }
            None => {
                debug!(content_type = ?key, "using event-stream decoder");
                Box::new(EventStreamDecoder::new(body, self.config.max_line_bytes))
            }
        }
    }
}

impl std::fmt::Debug for DecoderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut content_types: Vec<&String> = self.factories.keys().collect();
        content_types.sort();
        f.debug_struct("DecoderRegistry")
            .field("config", &self.config)
            .field("content_types", &content_types)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::testing::{VecDecoder, chunked_body};

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = DecoderRegistry::default();
        let factory = |_body: ResponseBody, _config: &StreamConfig| {
            Box::new(VecDecoder::<RawEvent>::new(Vec::new())) as BoxDecoder<RawEvent>
        };
        registry
            .register("application/vnd.test", factory)
            .expect("first registration");
        let err = registry.register("Application/Vnd.Test; charset=utf-8", factory);
        assert!(matches!(err, Err(StreamError::Config(msg)) if msg.contains("duplicate")));
    }

    #[tokio::test]
    async fn registered_content_type_wins() {
        let mut registry = DecoderRegistry::default();
        registry
            .register("application/vnd.test", |_body: ResponseBody, _config: &StreamConfig| {
                Box::new(VecDecoder::new(vec![RawEvent::new("custom", "x")]))
                    as BoxDecoder<RawEvent>
            })
            .expect("register");

        let body = chunked_body("application/vnd.test; charset=utf-8", &[b"data: ignored\n\n"]);
        let mut decoder = registry.decoder_for(body);
        assert!(decoder.next().await);
        assert_eq!(decoder.current().map(|e| e.event_type.as_str()), Some("custom"));
    }

    #[tokio::test]
    async fn unknown_or_missing_content_type_falls_back_to_event_stream() {
        let registry = DecoderRegistry::with_defaults(StreamConfig::default());
        let body = ResponseBody::from_bytes("text/event-stream", "event: ping\ndata: {}\n\n");
        let mut decoder = registry.decoder_for(body);
        assert!(decoder.next().await);
        assert_eq!(decoder.current().map(|e| e.event_type.as_str()), Some("ping"));

        let body = ResponseBody::new(
            None,
            futures::stream::iter(vec![Ok(bytes::Bytes::from_static(b"data: 1\n\n"))]),
        );
        let mut decoder = registry.decoder_for(body);
        assert!(decoder.next().await);
        assert_eq!(decoder.current().map(|e| &e.data[..]), Some(&b"1"[..]));
    }

    #[tokio::test]
    async fn defaults_route_ndjson_to_json_lines() {
        let registry = DecoderRegistry::default();
        assert!(registry.is_registered("application/x-ndjson"));
        assert!(!DecoderRegistry::new(StreamConfig::default()).is_registered("application/x-ndjson"));
        let body = ResponseBody::from_bytes("application/x-ndjson", "{\"a\":1}\n");
        let mut decoder = registry.decoder_for(body);
        assert!(decoder.next().await);
        assert_eq!(decoder.current().map(|e| &e.data[..]), Some(&b"{\"a\":1}"[..]));
    }
}

//! Wire decoders and the content-type registry that picks one per response.
//!
//! A [`Decoder`] is a forward-only cursor: call [`Decoder::next`] until it
//! returns `false`, read each record through [`Decoder::current`], then check
//! [`Decoder::err`] to tell a clean end from a failure.
use std::pin::Pin;

use bytes::Bytes;
use futures::StreamExt as _;

use crate::errors::StreamError;

mod event_stream;
mod json_lines;
mod lines;
mod registry;

pub use event_stream::EventStreamDecoder;
pub use json_lines::JsonLinesDecoder;
pub use registry::{DecoderFactory, DecoderRegistry};

/// Content type of a standard server-sent-events body.
pub const EVENT_STREAM_CONTENT_TYPE: &str = "text/event-stream";
/// Content type of a newline-delimited JSON body.
pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// Byte stream backing a response body.
pub type ByteStream = Pin<Box<dyn futures::Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Boxed decoder, the usual currency between pipeline stages.
pub type BoxDecoder<T> = Box<dyn Decoder<Item = T>>;

/// One dispatched record from a wire decoder.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawEvent {
    /// Value of the last `event:` field, empty when the record had none.
    pub event_type: String,
    /// Concatenated `data:` values.
    pub data: Bytes,
}

impl RawEvent {
    pub fn new(event_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            event_type: event_type.into(),
            data: data.into(),
        }
    }
}

/// Pull cursor over decoded records.
#[async_trait::async_trait]
pub trait Decoder: Send {
    type Item: Send;

    /// Advances to the next record. Returns `false` at the end of the sequence
    /// or after a failure; check [`Decoder::err`] to tell them apart.
    async fn next(&mut self) -> bool;

    /// Record produced by the last successful [`Decoder::next`].
    fn current(&self) -> Option<&Self::Item>;

    /// Failure that ended iteration, if any.
    fn err(&self) -> Option<&StreamError>;

    /// Releases the underlying connection. Safe to call more than once.
    async fn close(&mut self) -> Result<(), StreamError>;
}

#[async_trait::async_trait]
impl<D> Decoder for Box<D>
where
    D: Decoder + ?Sized,
{
    type Item = D::Item;

    async fn next(&mut self) -> bool {
        (**self).next().await
    }

    fn current(&self) -> Option<&Self::Item> {
        (**self).current()
    }

    fn err(&self) -> Option<&StreamError> {
        (**self).err()
    }

    async fn close(&mut self) -> Result<(), StreamError> {
        (**self).close().await
    }
}

/// An established streaming response body handed over by the request executor.
pub struct ResponseBody {
    content_type: Option<String>,
    stream: ByteStream,
}

impl ResponseBody {
    /// Wraps an arbitrary byte stream.
    pub fn new<S>(content_type: Option<String>, stream: S) -> Self
    where
        S: futures::Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static,
    {
        Self {
            content_type,
            stream: Box::pin(stream),
        }
    }

    /// Wraps an in-memory body delivered as a single chunk.
    pub fn from_bytes(content_type: impl Into<String>, body: impl Into<Bytes>) -> Self {
        let chunk: Bytes = body.into();
        Self::new(
            Some(content_type.into()),
            futures::stream::once(async move { Ok(chunk) }),
        )
    }

    /// Wraps a `reqwest` response, keeping its `content-type` header.
    pub fn from_reqwest(response: reqwest::Response) -> Self {
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(ToOwned::to_owned);
        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(std::io::Error::other));
        Self::new(content_type, stream)
    }

    /// Declared content type, if the executor provided one.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub(crate) fn into_stream(self) -> ByteStream {
        self.stream
    }
}

impl std::fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseBody")
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// Lower-cases a content type and drops its parameters.
pub(crate) fn normalize_content_type(value: &str) -> String {
    value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

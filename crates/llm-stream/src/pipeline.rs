//! Decoder to handler composition.
//!
//! A [`Pipeline`] pulls records from a [`Decoder`] and maps each one through a
//! [`Handler`]. Because a pipeline is itself a decoder, vendor streams are built
//! by stacking two of them: raw records into typed vendor records, then typed
//! records into [`ChatEvent`](crate::stream::ChatEvent)s.
use std::marker::PhantomData;

use bytes::Bytes;
use futures::Stream;
use serde::de::DeserializeOwned;
use tracing::trace;

use crate::decoder::{Decoder, RawEvent};
use crate::errors::StreamError;

/// Data payload some vendors send to mark the end of a stream.
pub const DONE_SENTINEL: &[u8] = b"[DONE]";

/// Maps one input record to one output record.
pub trait Handler<In>: Send {
    type Output: Send;

    /// Returns `false` to stop the stream cleanly before handling `event`.
    fn should_continue(&self, event: &In) -> bool;

    /// Maps a record. An error ends the stream.
    fn handle_event(&mut self, event: &In) -> Result<Self::Output, StreamError>;

    /// Error that ends the stream right after the output just produced.
    ///
    /// Lets a handler deliver an error record as an event and still terminate
    /// with that error.
    fn take_terminal_error(&mut self) -> Option<StreamError> {
        None
    }
}

/// Pull cursor over the outputs of `handler` applied to `decoder`.
pub struct Pipeline<D, H>
where
    D: Decoder,
    H: Handler<D::Item>,
{
    decoder: D,
    handler: H,
    current: Option<H::Output>,
    err: Option<StreamError>,
    done: bool,
}

impl<D, H> Pipeline<D, H>
where
    D: Decoder,
    H: Handler<D::Item>,
{
    pub fn new(decoder: D, handler: H) -> Self {
        Self {
            decoder,
            handler,
            current: None,
            err: None,
            done: false,
        }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }
}

#[async_trait::async_trait]
impl<D, H> Decoder for Pipeline<D, H>
where
    D: Decoder,
    H: Handler<D::Item>,
{
    type Item = H::Output;

    async fn next(&mut self) -> bool {
        if self.done {
            return false;
        }
        if let Some(err) = self.handler.take_terminal_error() {
            self.fail(err);
            return false;
        }
        if !self.decoder.next().await {
            self.done = true;
            if let Some(err) = self.decoder.err() {
                self.err = Some(err.clone());
            }
            return false;
        }
        let Some(event) = self.decoder.current() else {
            self.done = true;
            return false;
        };
        if !self.handler.should_continue(event) {
            trace!("handler stopped the stream");
            self.done = true;
            return false;
        }
        match self.handler.handle_event(event) {
            Ok(output) => {
                self.current = Some(output);
                true
            }
            Err(err) => {
                self.fail(err);
                false
            }
        }
    }

    fn current(&self) -> Option<&Self::Item> {
        self.current.as_ref()
    }

    fn err(&self) -> Option<&StreamError> {
        self.err.as_ref()
    }

    async fn close(&mut self) -> Result<(), StreamError> {
        self.decoder.close().await
    }
}

impl<D, H> Pipeline<D, H>
where
    D: Decoder,
    H: Handler<D::Item>,
{
    fn fail(&mut self, err: StreamError) {
        self.done = true;
        self.err = Some(err);
    }
}

/// Decodes each record's JSON payload into `T`.
///
/// Empty payloads become `T::default()` and the `[DONE]` sentinel ends the
/// stream.
pub struct JsonRecordHandler<T> {
    context: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonRecordHandler<T> {
    /// `context` names the record type in decode errors.
    pub fn new(context: &'static str) -> Self {
        Self {
            context,
            _marker: PhantomData,
        }
    }
}

impl<T> Handler<RawEvent> for JsonRecordHandler<T>
where
    T: DeserializeOwned + Default + Send,
{
    type Output = T;

    fn should_continue(&self, event: &RawEvent) -> bool {
        !is_done_sentinel(&event.data)
    }

    fn handle_event(&mut self, event: &RawEvent) -> Result<T, StreamError> {
        decode_json(self.context, &event.data)
    }
}

pub(crate) fn is_done_sentinel(data: &Bytes) -> bool {
    data.trim_ascii() == DONE_SENTINEL
}

/// Parses a record payload, treating an empty payload as `T::default()`.
pub(crate) fn decode_json<T>(context: &str, data: &[u8]) -> Result<T, StreamError>
where
    T: DeserializeOwned + Default,
{
    if data.trim_ascii().is_empty() {
        return Ok(T::default());
    }
    serde_json::from_slice(data).map_err(|e| StreamError::decode(context, e, data))
}

/// Adapts a decoder into a `Stream`, closing the decoder when it ends.
pub fn into_stream<D>(decoder: D) -> impl Stream<Item = Result<D::Item, StreamError>> + Send
where
    D: Decoder + 'static,
    D::Item: Clone,
{
    futures::stream::unfold(Some(decoder), |state| async move {
        let mut decoder = state?;
        if decoder.next().await {
            let item = decoder.current().cloned()?;
            return Some((Ok(item), Some(decoder)));
        }
        let err = decoder.err().cloned();
        let closed = decoder.close().await;
        err.or(closed.err()).map(|err| (Err(err), None))
    })
}

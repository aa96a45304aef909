//! Bridges a pull cursor into a bounded push channel.
//!
//! One task per stream pulls events and sends them in wire order. Shutdown
//! contract: the decoder is closed exactly once, then the sender is dropped,
//! then the task returns the stream's terminal error (or
//! [`StreamError::Cancelled`]).
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument as _, debug, debug_span, warn};

use crate::decoder::Decoder;
use crate::errors::StreamError;
use crate::stream::{ChatEvent, ChatResponse, EventKind};

/// Pumps `stream` into `tx` until it ends, fails or `cancel` fires.
///
/// A dropped receiver counts as cancellation.
pub async fn relay<D>(
    mut stream: D,
    tx: mpsc::Sender<D::Item>,
    cancel: CancellationToken,
) -> Result<(), StreamError>
where
    D: Decoder,
    D::Item: Clone,
{
    let result = pump(&mut stream, &tx, &cancel).await;
    if let Err(err) = stream.close().await {
        warn!(error = %err, "closing stream failed");
    }
    drop(tx);
    match &result {
        Ok(()) => debug!("relay finished"),
        Err(err) => debug!(error = %err, "relay stopped"),
    }
    result
}

async fn pump<D>(
    stream: &mut D,
    tx: &mpsc::Sender<D::Item>,
    cancel: &CancellationToken,
) -> Result<(), StreamError>
where
    D: Decoder,
    D::Item: Clone,
{
    loop {
        let advanced = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StreamError::Cancelled),
            advanced = stream.next() => advanced,
        };
        if !advanced {
            return match stream.err() {
                Some(err) => Err(err.clone()),
                None => Ok(()),
            };
        }
        let Some(item) = stream.current().cloned() else {
            return Ok(());
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StreamError::Cancelled),
            sent = tx.send(item) => {
                if sent.is_err() {
                    debug!("relay receiver dropped");
                    return Err(StreamError::Cancelled);
                }
            }
        }
    }
}

/// Spawns [`relay`] on the current runtime.
///
/// `cancel` is the caller's token; [`EventRelay::cancel`] only cancels a child
/// of it. A `capacity` of zero is treated as one.
pub fn spawn_relay<D>(stream: D, capacity: usize, cancel: &CancellationToken) -> EventRelay<D::Item>
where
    D: Decoder + 'static,
    D::Item: Clone + 'static,
{
    let stream_id = uuid::Uuid::new_v4();
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let cancel = cancel.child_token();
    let span = debug_span!("relay", stream_id = %stream_id);
    let task = tokio::spawn(relay(stream, tx, cancel.clone()).instrument(span));
    debug!(stream_id = %stream_id, capacity, "relay spawned");
    EventRelay {
        stream_id,
        rx,
        cancel,
        task,
    }
}

/// Consumer side of a spawned relay.
///
/// Dropping the handle without [`EventRelay::finish`] stops the task at its
/// next send.
pub struct EventRelay<T = ChatEvent> {
    stream_id: uuid::Uuid,
    rx: mpsc::Receiver<T>,
    cancel: CancellationToken,
    task: JoinHandle<Result<(), StreamError>>,
}

impl<T> EventRelay<T> {
    pub fn stream_id(&self) -> uuid::Uuid {
        self.stream_id
    }

    /// Waits for the next event. Returns `None` once the relay has stopped.
    pub async fn next_event(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Requests cancellation. The relay stops at its next read or send.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Drains unread events and returns the task's result.
    pub async fn finish(mut self) -> Result<(), StreamError> {
        while self.rx.recv().await.is_some() {}
        self.join().await
    }

    async fn join(self) -> Result<(), StreamError> {
        match self.task.await {
            Ok(result) => result,
            Err(err) => Err(StreamError::Relay(err.to_string())),
        }
    }
}

impl EventRelay<ChatEvent> {
    /// Runs to completion and returns the final response snapshot.
    ///
    /// Snapshots attached after `message_stop` (late usage) replace the one
    /// carried by the stop event.
    pub async fn collect_response(mut self) -> Result<ChatResponse, StreamError> {
        let mut response = None;
        let mut stopped = false;
        while let Some(event) = self.rx.recv().await {
            if event.kind == EventKind::MessageStop {
                stopped = true;
            }
            if stopped && let Some(message) = event.message {
                response = Some(message);
            }
        }
        self.join().await?;
        response.ok_or_else(|| StreamError::transport("stream ended before message_stop"))
    }
}

impl<T> std::fmt::Debug for EventRelay<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRelay")
            .field("stream_id", &self.stream_id)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

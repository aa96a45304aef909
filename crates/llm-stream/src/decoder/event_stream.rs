use tracing::trace;

use super::lines::LineReader;
use super::{Decoder, RawEvent, ResponseBody};
use crate::errors::StreamError;

/// Generic `text/event-stream` decoder.
///
/// Dispatches one [`RawEvent`] per blank-line terminated block. `data:` values
/// are concatenated without a separator; comment lines (empty field name) and
/// unknown fields are skipped.
pub struct EventStreamDecoder {
    lines: LineReader,
    current: Option<RawEvent>,
    err: Option<StreamError>,
}

impl EventStreamDecoder {
    pub fn new(body: ResponseBody, max_line_bytes: usize) -> Self {
        Self {
            lines: LineReader::new(body.into_stream(), max_line_bytes),
            current: None,
            err: None,
        }
    }
}

#[async_trait::async_trait]
impl Decoder for EventStreamDecoder {
    type Item = RawEvent;

    async fn next(&mut self) -> bool {
        if self.err.is_some() {
            return false;
        }

        let mut event_type = String::new();
        let mut data: Vec<u8> = Vec::new();
        loop {
            let line = match self.lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => return false,
                Err(err) => {
                    self.err = Some(err);
                    return false;
                }
            };

            if line.is_empty() {
                if event_type.is_empty() && data.is_empty() {
                    continue;
                }
                trace!(event_type = %event_type, bytes = data.len(), "dispatching event-stream record");
                self.current = Some(RawEvent::new(event_type, data));
                return true;
            }

            let (name, value) = split_field(&line);
            match name {
                b"" => continue,
                b"event" => event_type = String::from_utf8_lossy(value).into_owned(),
                b"data" => data.extend_from_slice(value),
                _ => {}
            }
        }
    }

    fn current(&self) -> Option<&RawEvent> {
        self.current.as_ref()
    }

    fn err(&self) -> Option<&StreamError> {
        self.err.as_ref()
    }

    async fn close(&mut self) -> Result<(), StreamError> {
        if self.lines.close() {
            trace!("event-stream body released");
        }
        Ok(())
    }
}

/// Splits `name: value`, consuming at most one space after the colon.
fn split_field(line: &[u8]) -> (&[u8], &[u8]) {
    match line.iter().position(|b| *b == b':') {
        Some(idx) => {
            let value = &line[idx + 1..];
            (&line[..idx], value.strip_prefix(b" ").unwrap_or(value))
        }
        None => (line, &line[line.len()..]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::testing::chunked_body;

    async fn collect(decoder: &mut EventStreamDecoder) -> Vec<RawEvent> {
        let mut out = Vec::new();
        while decoder.next().await {
            out.push(decoder.current().cloned().expect("current"));
        }
        out
    }

    #[tokio::test]
    async fn decodes_typed_records() {
        let body = chunked_body(
            "text/event-stream",
            &[b"event: message_start\ndata: {\"id\":\"m1\"}\n\nevent: ping\ndata: {}\n\n"],
        );
        let mut decoder = EventStreamDecoder::new(body, 1024);
        let events = collect(&mut decoder).await;
        assert_eq!(
            events,
            vec![
                RawEvent::new("message_start", &b"{\"id\":\"m1\"}"[..]),
                RawEvent::new("ping", &b"{}"[..]),
            ]
        );
        assert!(decoder.err().is_none());
    }

    #[tokio::test]
    async fn data_lines_concatenate_without_separator() {
        let body = chunked_body("text/event-stream", &[b"data: {\"a\":\ndata:1}\n\n"]);
        let mut decoder = EventStreamDecoder::new(body, 1024);
        let events = collect(&mut decoder).await;
        assert_eq!(events.len(), 1);
        assert_eq!(&events[0].data[..], b"{\"a\":1}");
        assert_eq!(events[0].event_type, "");
    }

    #[tokio::test]
    async fn strips_only_one_leading_space() {
        let body = chunked_body("text/event-stream", &[b"data:  two\n\n"]);
        let mut decoder = EventStreamDecoder::new(body, 1024);
        let events = collect(&mut decoder).await;
        assert_eq!(&events[0].data[..], b" two");
    }

    #[tokio::test]
    async fn comments_unknown_fields_and_bare_blank_lines_are_skipped() {
        let body = chunked_body(
            "text/event-stream",
            &[b": OPENROUTER PROCESSING\n\n\nid: 7\nretry: 10\ndata: x\n\n"],
        );
        let mut decoder = EventStreamDecoder::new(body, 1024);
        let events = collect(&mut decoder).await;
        assert_eq!(events, vec![RawEvent::new("", &b"x"[..])]);
    }

    #[tokio::test]
    async fn records_split_across_chunks_and_crlf() {
        let body = chunked_body(
            "text/event-stream",
            &[b"event: content_block_delta\r\nda", b"ta: {\"index\":0}\r", b"\n\r\n"],
        );
        let mut decoder = EventStreamDecoder::new(body, 1024);
        let events = collect(&mut decoder).await;
        assert_eq!(
            events,
            vec![RawEvent::new("content_block_delta", &b"{\"index\":0}"[..])]
        );
    }

    #[tokio::test]
    async fn unterminated_record_is_not_dispatched() {
        let body = chunked_body("text/event-stream", &[b"data: first\n\ndata: second\n"]);
        let mut decoder = EventStreamDecoder::new(body, 1024);
        let events = collect(&mut decoder).await;
        assert_eq!(events.len(), 1);
        assert!(decoder.err().is_none());
    }

    #[tokio::test]
    async fn read_error_is_exposed_and_sticky() {
        let chunks: Vec<Result<bytes::Bytes, std::io::Error>> = vec![
            Ok(bytes::Bytes::from_static(b"data: ok\n\n")),
            Err(std::io::Error::other("reset by peer")),
        ];
        let body = ResponseBody::new(
            Some("text/event-stream".into()),
            futures::stream::iter(chunks),
        );
        let mut decoder = EventStreamDecoder::new(body, 1024);
        assert!(decoder.next().await);
        assert!(!decoder.next().await);
        assert!(decoder.err().is_some_and(StreamError::is_transport));
        assert!(!decoder.next().await);
    }

    #[tokio::test]
    async fn close_ends_iteration() {
        let body = chunked_body("text/event-stream", &[b"data: a\n\ndata: b\n\n"]);
        let mut decoder = EventStreamDecoder::new(body, 1024);
        assert!(decoder.next().await);
        decoder.close().await.expect("close");
        decoder.close().await.expect("second close is a no-op");
        assert!(!decoder.next().await);
        assert!(decoder.err().is_none());
    }
}

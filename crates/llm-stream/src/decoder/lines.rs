use bytes::{Bytes, BytesMut};
use futures::StreamExt as _;

use super::ByteStream;
use crate::errors::StreamError;

/// Splits a byte stream into LF or CRLF terminated lines.
///
/// A trailing fragment without a terminator is discarded at end of stream.
/// Lines longer than `max_line_bytes` fail whether or not their terminator
/// arrived in the same chunk.
pub(crate) struct LineReader {
    body: Option<ByteStream>,
    buf: BytesMut,
    scanned: usize,
    eof: bool,
    max_line_bytes: usize,
}

impl LineReader {
    pub(crate) fn new(body: ByteStream, max_line_bytes: usize) -> Self {
        Self {
            body: Some(body),
            buf: BytesMut::new(),
            scanned: 0,
            eof: false,
            max_line_bytes,
        }
    }

    /// Returns the next line without its terminator, `Ok(None)` at end of stream.
    pub(crate) async fn next_line(&mut self) -> Result<Option<Bytes>, StreamError> {
        loop {
            if let Some(pos) = self.buf[self.scanned..].iter().position(|b| *b == b'\n') {
                let end = self.scanned + pos;
                self.scanned = 0;
                let mut line = self.buf.split_to(end + 1);
                line.truncate(end);
                if line.last() == Some(&b'\r') {
                    line.truncate(end - 1);
                }
                if line.len() > self.max_line_bytes {
                    return Err(self.oversized());
                }
                return Ok(Some(line.freeze()));
            }
            self.scanned = self.buf.len();

            if self.buf.len() > self.max_line_bytes {
                return Err(self.oversized());
            }
            if self.eof {
                self.buf.clear();
                self.scanned = 0;
                return Ok(None);
            }

            let Some(body) = self.body.as_mut() else {
                return Ok(None);
            };
            match body.next().await {
                Some(Ok(chunk)) => self.buf.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    return Err(StreamError::transport(format!("response body read failed: {e}")));
                }
                None => self.eof = true,
            }
        }
    }

    fn oversized(&self) -> StreamError {
        StreamError::transport(format!(
            "event-stream line exceeds {} bytes",
            self.max_line_bytes
        ))
    }

    /// Drops the body. Returns `false` when it was already released.
    pub(crate) fn close(&mut self) -> bool {
        self.buf.clear();
        self.scanned = 0;
        self.body.take().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(chunks: &[&'static [u8]], max: usize) -> LineReader {
        let chunks: Vec<Result<Bytes, std::io::Error>> =
            chunks.iter().map(|c| Ok(Bytes::from_static(c))).collect();
        LineReader::new(Box::pin(futures::stream::iter(chunks)), max)
    }

    #[tokio::test]
    async fn joins_lines_across_chunks_and_strips_crlf() {
        let mut lines = reader(&[b"ab", b"c\r\nde", b"f\n\n"], 1024);
        assert_eq!(lines.next_line().await.unwrap(), Some(Bytes::from_static(b"abc")));
        assert_eq!(lines.next_line().await.unwrap(), Some(Bytes::from_static(b"def")));
        assert_eq!(lines.next_line().await.unwrap(), Some(Bytes::new()));
        assert_eq!(lines.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn unterminated_tail_is_dropped() {
        let mut lines = reader(&[b"one\ntwo"], 1024);
        assert_eq!(lines.next_line().await.unwrap(), Some(Bytes::from_static(b"one")));
        assert_eq!(lines.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn oversized_line_is_a_transport_error() {
        let mut lines = reader(&[b"0123456789", b"0123456789"], 8);
        let err = lines.next_line().await.unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn oversized_line_in_a_single_chunk_is_rejected() {
        let mut lines = reader(&[b"0123456789012345\nok\n"], 8);
        let err = lines.next_line().await.unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn line_at_the_limit_is_accepted() {
        let mut lines = reader(&[b"01234567\r\n"], 8);
        assert_eq!(lines.next_line().await.unwrap(), Some(Bytes::from_static(b"01234567")));
        assert_eq!(lines.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn read_error_is_a_transport_error() {
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"partial")),
            Err(std::io::Error::other("connection reset")),
        ];
        let mut lines = LineReader::new(Box::pin(futures::stream::iter(chunks)), 1024);
        let err = lines.next_line().await.unwrap_err();
        assert!(err.to_string().contains("connection reset"));
    }

    #[tokio::test]
    async fn close_releases_body_once() {
        let mut lines = reader(&[b"a\n"], 1024);
        assert!(lines.close());
        assert!(!lines.close());
        assert_eq!(lines.next_line().await.unwrap(), None);
    }
}

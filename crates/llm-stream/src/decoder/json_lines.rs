use tracing::trace;

use super::lines::LineReader;
use super::{Decoder, RawEvent, ResponseBody};
use crate::errors::StreamError;

/// Decoder for newline-delimited JSON bodies.
///
/// Every non-blank line becomes one [`RawEvent`] with an empty event type, so
/// downstream handlers treat it exactly like an untyped `data:` record.
pub struct JsonLinesDecoder {
    lines: LineReader,
    current: Option<RawEvent>,
    err: Option<StreamError>,
}

impl JsonLinesDecoder {
    pub fn new(body: ResponseBody, max_line_bytes: usize) -> Self {
        Self {
            lines: LineReader::new(body.into_stream(), max_line_bytes),
            current: None,
            err: None,
        }
    }
}

#[async_trait::async_trait]
impl Decoder for JsonLinesDecoder {
    type Item = RawEvent;

    async fn next(&mut self) -> bool {
        if self.err.is_some() {
            return false;
        }
        loop {
            match self.lines.next_line().await {
                Ok(Some(line)) => {
                    if line.iter().all(u8::is_ascii_whitespace) {
                        continue;
                    }
                    self.current = Some(RawEvent::new(String::new(), line));
                    return true;
                }
                Ok(None) => return false,
                Err(err) => {
                    self.err = Some(err);
                    return false;
                }
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
            trace!("json-lines body released");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::testing::chunked_body;

    #[tokio::test]
    async fn each_line_is_one_record() {
        let body = chunked_body(
            "application/x-ndjson",
            &[b"{\"a\":1}\n\n  \n{\"b\"", b":2}\n"],
        );
        let mut decoder = JsonLinesDecoder::new(body, 1024);
        let mut data = Vec::new();
        while decoder.next().await {
            data.push(decoder.current().expect("current").data.clone());
        }
        assert_eq!(data, vec![&b"{\"a\":1}"[..], &b"{\"b\":2}"[..]]);
        assert!(decoder.err().is_none());
    }
}

use futures::stream::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};

use cogflow_core::error::{CogflowError, Result};

/// Parse a raw SSE byte stream into individual events.
/// SSE format: `event: <type>\ndata: <json>\n\n`
#[derive(Default)]
pub struct SseParser {
    buffer: String,
}

/// A parsed SSE event.
#[derive(Debug, Clone)]
pub struct SseEvent {
    pub event_type: Option<String>,
    pub data: String,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed text into the parser and extract complete events.
    pub fn feed(&mut self, chunk: &str) -> Vec<SseEvent> {
        // Some servers frame events with CRLF
        self.buffer.push_str(&chunk.replace("\r\n", "\n"));
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.find("\n\n") {
            let block: String = self.buffer.drain(..pos + 2).collect();

            let mut event_type = None;
            let mut data_lines = Vec::new();

            for line in block.lines() {
                if let Some(val) = line.strip_prefix("event:") {
                    event_type = Some(val.trim_start().to_string());
                } else if let Some(val) = line.strip_prefix("data:") {
                    data_lines.push(val.strip_prefix(' ').unwrap_or(val).to_string());
                }
            }

            if !data_lines.is_empty() {
                events.push(SseEvent {
                    event_type,
                    data: data_lines.join("\n"),
                });
            }
        }

        events
    }
}

/// Incremental UTF-8 decoder for byte chunks that may split a code point.
#[derive(Default)]
pub struct Utf8Chunker {
    carry: Vec<u8>,
}

impl Utf8Chunker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `bytes` and return every complete character decoded so far.
    pub fn push(&mut self, bytes: &[u8]) -> Result<String> {
        self.carry.extend_from_slice(bytes);
        match std::str::from_utf8(&self.carry) {
            Ok(text) => {
                let text = text.to_string();
                self.carry.clear();
                Ok(text)
            }
            // An incomplete trailing sequence: keep it for the next chunk
            Err(e) if e.error_len().is_none() => {
                let valid = e.valid_up_to();
                let rest = self.carry.split_off(valid);
                let text = String::from_utf8(std::mem::replace(&mut self.carry, rest))
                    .map_err(|e| CogflowError::LlmStream(e.to_string()))?;
                Ok(text)
            }
            Err(e) => Err(CogflowError::LlmStream(format!("invalid UTF-8 in stream: {e}"))),
        }
    }

    /// Whether a partial character is still buffered.
    pub fn has_pending(&self) -> bool {
        !self.carry.is_empty()
    }
}

/// A stream of SSE events from raw bytes.
pub struct SseStream<S> {
    inner: S,
    decoder: Utf8Chunker,
    parser: SseParser,
    pending: Vec<SseEvent>,
}

impl<S> SseStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            decoder: Utf8Chunker::new(),
            parser: SseParser::new(),
            pending: Vec::new(),
        }
    }
}

impl<S> Stream for SseStream<S>
where
    S: Stream<Item = std::result::Result<bytes::Bytes, reqwest::Error>> + Unpin,
{
    type Item = Result<SseEvent>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            // Return pending events first
            if !this.pending.is_empty() {
                return Poll::Ready(Some(Ok(this.pending.remove(0))));
            }

            match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    let text = match this.decoder.push(&bytes) {
                        Ok(text) => text,
                        Err(e) => return Poll::Ready(Some(Err(e))),
                    };
                    this.pending = this.parser.feed(&text);
                    // Loop: either yield a parsed event or poll for more bytes
                }
                Poll::Ready(Some(Err(e))) => {
                    return Poll::Ready(Some(Err(CogflowError::LlmStream(e.to_string()))))
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sse_parser_basic() {
        let mut parser = SseParser::new();
        let events = parser.feed("event: message_start\ndata: {\"type\":\"message_start\"}\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type.as_deref(), Some("message_start"));
        assert_eq!(events[0].data, "{\"type\":\"message_start\"}");
    }

    #[test]
    fn test_sse_parser_chunked() {
        let mut parser = SseParser::new();
        let events = parser.feed("data: {\"x\":");
        assert_eq!(events.len(), 0);
        let events = parser.feed("1}\n\ndata: [DONE]\n\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data, "{\"x\":1}");
        assert_eq!(events[1].data, "[DONE]");
    }

    #[test]
    fn test_sse_parser_crlf() {
        let mut parser = SseParser::new();
        let events = parser.feed("data:{\"x\":2}\r\n\r\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "{\"x\":2}");
    }

    #[test]
    fn test_utf8_chunker_split_code_point() {
        let bytes = "héllo".as_bytes();
        let mut chunker = Utf8Chunker::new();
        // 'é' is two bytes starting at index 1
        assert_eq!(chunker.push(&bytes[..2]).unwrap(), "h");
        assert!(chunker.has_pending());
        assert_eq!(chunker.push(&bytes[2..]).unwrap(), "éllo");
        assert!(!chunker.has_pending());
    }

    #[test]
    fn test_utf8_chunker_rejects_invalid() {
        let mut chunker = Utf8Chunker::new();
        assert!(chunker.push(&[0xff, b'a']).is_err());
    }

    #[tokio::test]
    async fn test_sse_stream_over_byte_chunks() {
        use futures::StreamExt;

        let chunks: Vec<std::result::Result<bytes::Bytes, reqwest::Error>> = vec![
            Ok(bytes::Bytes::from_static(b"data: a")),
            Ok(bytes::Bytes::from_static(b"\n\ndata: b\n\n")),
        ];
        let stream = SseStream::new(futures::stream::iter(chunks));
        let events: Vec<_> = stream.map(|e| e.unwrap().data).collect().await;
        assert_eq!(events, vec!["a", "b"]);
    }
}

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::Stream;
use serde::Deserialize;
use tracing::warn;

use flowforge_core::error::FlowforgeError;

use crate::protocol::ResponseDelta;

/// Parse a raw SSE byte stream into `data:` payloads.
/// The endpoint emits `data: <json>\n\n` frames and a final `data: [DONE]`.
#[derive(Default)]
pub struct SseParser {
    buffer: String,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes into the parser and extract complete frame payloads.
    pub fn feed(&mut self, chunk: &str) -> Vec<String> {
        self.buffer.push_str(chunk);
        let mut payloads = Vec::new();

        // Split on double newlines (frame boundaries)
        while let Some(pos) = self.buffer.find("\n\n") {
            let block = self.buffer[..pos].to_string();
            self.buffer = self.buffer[pos + 2..].to_string();

            let mut data_lines = Vec::new();
            for line in block.lines() {
                if let Some(val) = line.strip_prefix("data: ") {
                    data_lines.push(val.to_string());
                } else if let Some(val) = line.strip_prefix("data:") {
                    // data with no space after colon
                    data_lines.push(val.to_string());
                }
            }

            if !data_lines.is_empty() {
                payloads.push(data_lines.join("\n"));
            }
        }

        payloads
    }
}

#[derive(Deserialize)]
struct ContentFrame {
    content: String,
}

/// Decode one frame payload.
///
/// Malformed payloads decode to `None` and must be skipped by the
/// caller; they never abort the stream.
pub fn decode_frame(payload: &str) -> Option<ResponseDelta> {
    if payload.trim() == "[DONE]" {
        return Some(ResponseDelta::Done);
    }
    match serde_json::from_str::<ContentFrame>(payload) {
        Ok(frame) => Some(ResponseDelta::Content(frame.content)),
        Err(e) => {
            warn!(data = %payload, error = %e, "Skipping malformed stream frame");
            None
        }
    }
}

/// A stream of frame payloads over raw response bytes.
pub struct SseStream<S> {
    inner: S,
    parser: SseParser,
    pending: Vec<String>,
    done: bool,
}

impl<S> SseStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            parser: SseParser::new(),
            pending: Vec::new(),
            done: false,
        }
    }
}

impl<S> Stream for SseStream<S>
where
    S: Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Unpin,
{
    type Item = Result<String, FlowforgeError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        // Return pending payloads first
        if !this.pending.is_empty() {
            return Poll::Ready(Some(Ok(this.pending.remove(0))));
        }
        if this.done {
            return Poll::Ready(None);
        }

        // Poll inner stream for more bytes
        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(bytes))) => {
                if let Ok(text) = std::str::from_utf8(&bytes) {
                    let mut payloads = this.parser.feed(text);
                    if payloads.is_empty() {
                        // Need more data, wake again
                        cx.waker().wake_by_ref();
                        Poll::Pending
                    } else {
                        let first = payloads.remove(0);
                        this.pending = payloads;
                        Poll::Ready(Some(Ok(first)))
                    }
                } else {
                    cx.waker().wake_by_ref();
                    Poll::Pending
                }
            }
            Poll::Ready(Some(Err(e))) => {
                this.done = true;
                Poll::Ready(Some(Err(FlowforgeError::Stream(e.to_string()))))
            }
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

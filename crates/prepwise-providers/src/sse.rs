//! Server-Sent Events line parser.
//!
//! Turns a chunked byte body into a stream of [`SseEvent`]s. Lines may be
//! split across chunks, so a small buffer is carried between reads.

use std::fmt::Display;
use std::pin::Pin;

use bytes::Bytes;
use futures::Stream;
use tokio_stream::StreamExt;

/// A parsed SSE event.
#[derive(Debug, Clone)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
}

/// Parse a reqwest response body as an SSE stream.
pub fn parse_sse_stream(
    response: reqwest::Response,
) -> impl Stream<Item = anyhow::Result<SseEvent>> + Send {
    parse_sse_bytes(response.bytes_stream())
}

/// Parse any byte stream as SSE.
pub fn parse_sse_bytes<S, E>(bytes: S) -> impl Stream<Item = anyhow::Result<SseEvent>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + 'static,
{
    futures::stream::unfold(
        SseState {
            byte_stream: Box::pin(bytes),
            buffer: String::new(),
            pending: PendingEvent::default(),
        },
        |mut state| async move {
            loop {
                if let Some(newline_pos) = state.buffer.find('\n') {
                    let line = state.buffer[..newline_pos]
                        .trim_end_matches('\r')
                        .to_string();
                    state.buffer.drain(..=newline_pos);

                    if line.is_empty() {
                        if let Some(event) = state.pending.dispatch() {
                            return Some((Ok(event), state));
                        }
                        continue;
                    }
                    state.pending.field(&line);
                    continue;
                }

                match state.byte_stream.next().await {
                    Some(Ok(chunk)) => {
                        state.buffer.push_str(&String::from_utf8_lossy(&chunk));
                    }
                    Some(Err(e)) => {
                        return Some((Err(anyhow::anyhow!("SSE stream error: {e}")), state));
                    }
                    None => {
                        // Flush a trailing line that had no newline.
                        if !state.buffer.is_empty() {
                            let line = std::mem::take(&mut state.buffer);
                            state.pending.field(line.trim_end_matches('\r'));
                        }
                        return state.pending.dispatch().map(|event| (Ok(event), state));
                    }
                }
            }
        },
    )
}

type ByteStream<E> = Pin<Box<dyn Stream<Item = Result<Bytes, E>> + Send>>;

struct SseState<E> {
    byte_stream: ByteStream<E>,
    buffer: String,
    pending: PendingEvent,
}

#[derive(Default)]
struct PendingEvent {
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
}

impl PendingEvent {
    fn field(&mut self, line: &str) {
        if line.starts_with(':') {
            return;
        }
        if let Some(value) = line.strip_prefix("event:") {
            self.event = Some(value.trim_start().to_string());
        } else if let Some(value) = line.strip_prefix("data:") {
            self.data.push(value.trim_start().to_string());
        } else if let Some(value) = line.strip_prefix("id:") {
            self.id = Some(value.trim_start().to_string());
        }
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        if self.data.is_empty() {
            return None;
        }
        Some(SseEvent {
            event: self.event.take(),
            data: std::mem::take(&mut self.data).join("\n"),
            id: self.id.take(),
        })
    }
}

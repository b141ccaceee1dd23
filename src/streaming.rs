//! SSE stream relay
//!
//! Consumes the upstream event-stream chunk by chunk, reassembles logical
//! `data:` lines across arbitrary chunk boundaries, and re-emits a minimal
//! client-facing event stream: `data: {"content": ...}` frames for
//! incremental text, one `data: {"error": ...}` frame on mid-stream failure,
//! and exactly one terminal `data: [DONE]` frame when the stream ends for any
//! reason. Inline terminal markers from upstream are consumed, never
//! forwarded, so the client always sees a single authoritative terminator.

use std::convert::Infallible;
use std::sync::Arc;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::registry::StreamRegistry;

/// Accumulates bytes until complete newline-terminated lines are available.
///
/// Upstream data arrives in chunks that do not align with line boundaries;
/// the trailing incomplete fragment is carried over to the next push. Only
/// complete lines are converted to text, so multi-byte characters split
/// across chunks survive intact.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning every complete line it finished (without the
    /// trailing newline; a `\r` before it is stripped too). Blank lines are
    /// skipped since SSE uses them only as event separators.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if !line.is_empty() {
                lines.push(String::from_utf8_lossy(&line).into_owned());
            }
        }
        lines
    }

    /// Drain whatever partial line is left at end of stream.
    pub fn take_remainder(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        Some(rest)
    }
}

/// One decoded upstream event.
#[derive(Debug, PartialEq)]
pub enum RelayEvent {
    /// Incremental text extracted from a delta payload
    Content(String),
    /// The upstream terminal marker
    Done,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Decode one reassembled line. Lines without the `data: ` field prefix,
/// malformed JSON payloads, and deltas without text all decode to `None`;
/// none of them may terminate the stream.
pub fn parse_data_line(line: &str) -> Option<RelayEvent> {
    let payload = line.strip_prefix("data: ")?.trim();
    if payload == "[DONE]" {
        return Some(RelayEvent::Done);
    }

    let chunk: StreamChunk = match serde_json::from_str(payload) {
        Ok(chunk) => chunk,
        Err(e) => {
            debug!(error = %e, "Dropping malformed upstream event");
            return None;
        }
    };

    let text = chunk.choices.into_iter().next()?.delta.content?;
    if text.is_empty() {
        return None;
    }
    Some(RelayEvent::Content(text))
}

fn content_frame(text: &str) -> Bytes {
    let payload = serde_json::json!({ "content": text });
    Bytes::from(format!("data: {}\n\n", payload))
}

fn error_frame(message: &str) -> Bytes {
    let payload = serde_json::json!({ "error": message });
    Bytes::from(format!("data: {}\n\n", payload))
}

fn done_frame() -> Bytes {
    Bytes::from_static(b"data: [DONE]\n\n")
}

/// Removes the stream from the registry when the relay finishes or is
/// dropped. Client disconnects drop the response body mid-generator, so
/// cleanup must not depend on reaching the end of the relay loop.
struct DeregisterGuard {
    registry: Arc<StreamRegistry>,
    stream_id: String,
}

impl Drop for DeregisterGuard {
    fn drop(&mut self) {
        self.registry.deregister(&self.stream_id);
    }
}

/// Relay the upstream byte stream to the client as re-framed SSE events.
///
/// Runs until the upstream ends, errors, or the cancellation token fires;
/// always finishes with a single terminal frame. The stream is removed from
/// the registry when the relay completes or is dropped, whichever comes
/// first (a no-op when an explicit cancel got there first).
pub fn relay<S, E>(
    upstream: S,
    stream_id: String,
    registry: Arc<StreamRegistry>,
    cancel: CancellationToken,
) -> impl Stream<Item = Result<Bytes, Infallible>>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
{
    // Moved into the generator at construction, so it fires even when the
    // client drops the body before the first poll
    let guard = DeregisterGuard {
        registry,
        stream_id: stream_id.clone(),
    };

    enum Step {
        Chunk(Bytes),
        UpstreamError(String),
        UpstreamEnd,
        Cancelled,
    }

    async_stream::stream! {
        let _guard = guard;
        let mut upstream = std::pin::pin!(upstream);
        let mut buffer = LineBuffer::new();

        loop {
            let step = tokio::select! {
                biased;

                _ = cancel.cancelled() => Step::Cancelled,

                chunk = upstream.next() => match chunk {
                    Some(Ok(bytes)) => Step::Chunk(bytes),
                    Some(Err(e)) => Step::UpstreamError(e.to_string()),
                    None => Step::UpstreamEnd,
                },
            };

            match step {
                Step::Chunk(bytes) => {
                    for line in buffer.push(&bytes) {
                        match parse_data_line(&line) {
                            Some(RelayEvent::Content(text)) => {
                                yield Ok(content_frame(&text));
                            }
                            // Inline terminal markers are consumed; the
                            // canonical one goes out at stream end
                            Some(RelayEvent::Done) | None => {}
                        }
                    }
                }
                Step::UpstreamError(e) => {
                    warn!(stream_id = %stream_id, error = %e, "Upstream stream error");
                    yield Ok(error_frame("stream processing error"));
                    break;
                }
                Step::UpstreamEnd => {
                    if let Some(line) = buffer.take_remainder() {
                        if let Some(RelayEvent::Content(text)) = parse_data_line(&line) {
                            yield Ok(content_frame(&text));
                        }
                    }
                    debug!(stream_id = %stream_id, "Upstream stream ended");
                    break;
                }
                Step::Cancelled => {
                    debug!(stream_id = %stream_id, "Relay stopped by client cancel");
                    break;
                }
            }
        }

        yield Ok(done_frame());
    }
}

//! SSE plumbing: the upstream event consumer and outbound framing.
//!
//! The upstream streams line-framed SSE where each `data:` line carries a
//! JSON envelope `{"data": {"phase", "delta_content", "edit_content",
//! "done"}}`. Anything that is not such a line (comments, heartbeats,
//! partial frames) is discarded silently; stream chunking is arbitrary so
//! unparsable lines are expected, not errors. The consumer never stops
//! early on `done` — that decision belongs to the caller.

use crate::transformer::canonical::{Phase, UpstreamEvent};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    data: Option<EventPayload>,
}

#[derive(Debug, Deserialize)]
struct EventPayload {
    #[serde(default)]
    phase: Option<String>,
    #[serde(default)]
    delta_content: Option<String>,
    #[serde(default)]
    edit_content: Option<String>,
    #[serde(default)]
    done: bool,
}

/// Lazy, non-restartable sequence of upstream events from a streaming
/// response. Dropping the stream drops the response and closes the
/// upstream connection, which is how caller cancellation propagates.
pub fn upstream_events(response: reqwest::Response) -> impl Stream<Item = UpstreamEvent> {
    events_from_bytes(response.bytes_stream())
}

/// Line-buffered scan over a raw byte stream.
pub fn events_from_bytes<S, E>(bytes: S) -> impl Stream<Item = UpstreamEvent>
where
    S: Stream<Item = std::result::Result<Bytes, E>>,
    E: std::fmt::Display,
{
    async_stream::stream! {
        futures::pin_mut!(bytes);
        let mut buffer = String::new();

        while let Some(chunk) = bytes.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    tracing::warn!("upstream stream error: {}", e);
                    break;
                }
            };
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(pos) = buffer.find('\n') {
                let line: String = buffer.drain(..=pos).collect();
                if let Some(event) = parse_line(line.trim_end_matches('\n').trim_end_matches('\r')) {
                    yield event;
                }
            }
        }

        // a final line may arrive without a trailing newline
        if !buffer.is_empty() {
            if let Some(event) = parse_line(buffer.trim_end_matches('\r')) {
                yield event;
            }
        }
    }
}

fn parse_line(line: &str) -> Option<UpstreamEvent> {
    let payload = line.strip_prefix("data: ")?;
    let envelope: Envelope = serde_json::from_str(payload).ok()?;
    let data = envelope.data?;

    let delta = data.delta_content.unwrap_or_default();
    let text = if delta.is_empty() {
        data.edit_content.unwrap_or_default()
    } else {
        delta
    };
    let phase = Phase::from_label(data.phase.as_deref().unwrap_or(""));

    Some(UpstreamEvent {
        phase,
        text,
        done: data.done,
    })
}

/// Format a simple data-only SSE frame.
pub fn format_sse_data(data: &str) -> String {
    format!("data: {}\n\n", data)
}

/// Format a named SSE event frame.
pub fn format_sse_event(event: &str, data: &str) -> String {
    format!("event: {}\ndata: {}\n\n", event, data)
}

/// Format the SSE done marker.
pub fn format_sse_done() -> String {
    "data: [DONE]\n\n".to_string()
}

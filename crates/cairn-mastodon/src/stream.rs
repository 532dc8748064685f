//! SSE parsing for the Mastodon streaming API.
//!
//! Bytes arrive in arbitrary chunks, get appended to an accumulator, and
//! only complete lines (split on the last `\n`) are handed to the line
//! parser — the trailing partial line is held back until more bytes
//! arrive. Mastodon frames `event: <type>` then `data: <json>`, one blank
//! line apart.

use async_stream::stream;
use futures_util::Stream;
use serde_json::Value;
use tracing::warn;

use crate::types::{Notification, Status, TimelineEvent};

enum SseLine {
    Event(String),
    Data(String),
    Blank,
}

fn parse_sse_line(line: &str) -> Option<SseLine> {
    if line.is_empty() {
        return Some(SseLine::Blank);
    }
    if let Some(rest) = line.strip_prefix("event: ") {
        return Some(SseLine::Event(rest.to_string()));
    }
    if let Some(rest) = line.strip_prefix("data: ") {
        return Some(SseLine::Data(rest.to_string()));
    }
    None
}

fn build_event(event_name: &str, data: &str) -> TimelineEvent {
    match event_name {
        "notification" => match serde_json::from_str::<Notification>(data) {
            Ok(n) => TimelineEvent::Notification(n),
            Err(e) => {
                warn!(error = %e, "failed to parse notification payload");
                TimelineEvent::Other {
                    event: event_name.to_string(),
                    raw: data.to_string(),
                }
            }
        },
        "update" => match serde_json::from_str::<Status>(data) {
            Ok(s) => TimelineEvent::Update(s),
            Err(e) => {
                warn!(error = %e, "failed to parse update payload");
                TimelineEvent::Other {
                    event: event_name.to_string(),
                    raw: data.to_string(),
                }
            }
        },
        "delete" => {
            let id = serde_json::from_str::<Value>(data)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_else(|| data.trim_matches('"').to_string());
            TimelineEvent::Delete(id)
        }
        other => TimelineEvent::Other {
            event: other.to_string(),
            raw: data.to_string(),
        },
    }
}

/// Consumes a `reqwest` byte stream and yields parsed `TimelineEvent`s.
/// The stream ends (without error) when the connection is closed; the
/// caller reconnects with backoff.
pub fn parse_sse_stream<S, E>(byte_stream: S) -> impl Stream<Item = TimelineEvent>
where
    S: Stream<Item = std::result::Result<bytes::Bytes, E>> + Unpin,
    E: std::fmt::Display,
{
    stream! {
        use futures_util::StreamExt;

        let mut byte_stream = byte_stream;
        let mut line_buf = String::new();
        let mut current_event: Option<String> = None;

        while let Some(chunk) = byte_stream.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    warn!(error = %e, "stream read error, ending stream");
                    break;
                }
            };
            line_buf.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(pos) = line_buf.find('\n') {
                let line: String = line_buf.drain(..=pos).collect();
                let line = line.trim_end_matches(['\r', '\n']);
                match parse_sse_line(line) {
                    Some(SseLine::Event(name)) => current_event = Some(name),
                    Some(SseLine::Data(data)) => {
                        if let Some(name) = current_event.take() {
                            yield build_event(&name, &data);
                        }
                    }
                    Some(SseLine::Blank) | None => {}
                }
            }
        }
    }
}

//! Stream event types and frame decoding for `/chat/stream`
//!
//! The backend streams `data: <json>` lines over the response body and
//! closes the connection after a terminal event.

use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio_stream::Stream;

/// Events delivered over an open streaming connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Session identifier assigned by the backend
    SessionInfo { session_id: String },
    /// Incremental response text
    Chunk { text: String },
    /// Generation finished
    Complete {
        timestamp: String,
        #[serde(default)]
        latency: Option<f64>,
        #[serde(default)]
        session_id: Option<String>,
    },
    /// Generation failed
    Error {
        message: String,
        #[serde(default)]
        limit_reached: bool,
    },
}

impl StreamEvent {
    /// Check if this event ends the stream (Complete or Error)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamEvent::Complete { .. } | StreamEvent::Error { .. }
        )
    }
}

/// A stream of decoded events
pub type StreamEventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// Prefix of every event-carrying line
pub const DATA_PREFIX: &str = "data: ";

/// Decode one line of the response body.
///
/// Lines without the `data: ` prefix (keep-alives, blank separators) and
/// undecodable payloads yield `None`; the caller skips them without
/// aborting the stream.
pub fn decode_frame(line: &str) -> Option<StreamEvent> {
    let payload = line.strip_prefix(DATA_PREFIX)?;
    match serde_json::from_str(payload) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::debug!("skipping malformed stream frame: {}", e);
            None
        }
    }
}

/// Drain complete newline-terminated lines from `buffer`, leaving any
/// trailing partial line in place for the next network chunk.
///
/// The buffer holds raw bytes: a multi-byte character may be split across
/// network chunks, so decoding happens per complete line only.
pub fn drain_lines(buffer: &mut Vec<u8>) -> Vec<String> {
    let mut lines = Vec::new();
    while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
        let line: Vec<u8> = buffer.drain(..=pos).collect();
        lines.push(String::from_utf8_lossy(&line).trim_end().to_string());
    }
    lines
}

//! Folds a generation's event stream into transcript updates.
//!
//! One reducer instance drives exactly one target assistant message,
//! inserted as a Pending placeholder before the stream opens. Each event
//! produces a new transcript; the reducer carries the accumulation and
//! terminal bookkeeping between events.

use parley_api::StreamEvent;

use crate::{
    fallback,
    transcript::{MessageStatus, Transcript, parse_rfc3339_millis},
};

/// Marker appended to a generation the user stopped mid-stream
pub const STOPPED_SUFFIX: &str = "\n\n[Generation stopped by user]";

/// How a finished stream ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamEnd {
    /// Still running
    #[default]
    Open,
    Completed,
    Failed,
    Cancelled,
}

/// How the final content is committed to the target message.
///
/// A fresh generation replaces the placeholder's version list; a
/// regeneration appends a new version so earlier results stay navigable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommitMode {
    #[default]
    Replace,
    AppendVersion,
}

/// Everything the caller needs after the fold ends
#[derive(Debug, Clone, Default)]
pub struct StreamOutcome {
    pub end: StreamEnd,
    /// Accumulated response text at the end of the stream
    pub content: String,
    pub latency: Option<f64>,
    /// Session id announced mid-stream that differs from the active one
    pub pending_session_id: Option<String>,
    /// The in-band fallback marker appeared in a chunk
    pub fallback_detected: bool,
    pub limit_reached: bool,
    pub error_message: Option<String>,
}

/// Incremental fold of stream events into a transcript
pub struct StreamReducer {
    target_id: String,
    active_session_id: String,
    mode: CommitMode,
    content: String,
    started: bool,
    end: StreamEnd,
    latency: Option<f64>,
    pending_session_id: Option<String>,
    fallback_detected: bool,
    limit_reached: bool,
    error_message: Option<String>,
}

impl StreamReducer {
    pub fn new(target_id: impl Into<String>, active_session_id: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            active_session_id: active_session_id.into(),
            mode: CommitMode::Replace,
            content: String::new(),
            started: false,
            end: StreamEnd::Open,
            latency: None,
            pending_session_id: None,
            fallback_detected: false,
            limit_reached: false,
            error_message: None,
        }
    }

    pub fn with_mode(mut self, mode: CommitMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn is_done(&self) -> bool {
        self.end != StreamEnd::Open
    }

    /// Fold one event, returning the updated transcript.
    ///
    /// Events after a terminal one are ignored.
    pub fn apply(&mut self, transcript: &Transcript, event: &StreamEvent) -> Transcript {
        if self.is_done() {
            return transcript.clone();
        }

        match event {
            StreamEvent::SessionInfo { session_id } => {
                // Remembered, not committed; the caller adopts it after
                // the stream ends.
                if *session_id != self.active_session_id {
                    self.pending_session_id = Some(session_id.clone());
                }
                transcript.clone()
            }
            StreamEvent::Chunk { text } => {
                if fallback::contains_fallback_marker(text) {
                    self.fallback_detected = true;
                }
                if self.started {
                    self.content.push_str(text);
                } else {
                    // First chunk replaces the empty accumulation.
                    self.content = text.clone();
                    self.started = true;
                }
                transcript
                    .replace_content(&self.target_id, self.content.clone())
                    .set_status(&self.target_id, MessageStatus::Streaming)
            }
            StreamEvent::Complete {
                timestamp,
                latency,
                session_id,
            } => {
                self.end = StreamEnd::Completed;
                self.latency = *latency;
                if let Some(id) = session_id {
                    if *id != self.active_session_id {
                        self.pending_session_id = Some(id.clone());
                    }
                }
                let millis = parse_rfc3339_millis(timestamp);
                match self.mode {
                    CommitMode::Replace => {
                        transcript.commit_final(&self.target_id, self.content.clone(), millis)
                    }
                    CommitMode::AppendVersion => {
                        transcript.add_version(&self.target_id, self.content.clone(), millis)
                    }
                }
            }
            StreamEvent::Error {
                message,
                limit_reached,
            } => {
                self.end = StreamEnd::Failed;
                self.limit_reached = *limit_reached;
                self.error_message = Some(message.clone());
                match self.mode {
                    CommitMode::Replace => transcript
                        .replace_content(&self.target_id, message.clone())
                        .set_status(&self.target_id, MessageStatus::Error),
                    // A failed regenerate keeps the displayed version; the
                    // failure is surfaced through the outcome only.
                    CommitMode::AppendVersion => self.restore_displayed(transcript),
                }
            }
        }
    }

    /// Stop the generation. A fresh generation keeps whatever accumulated
    /// plus the fixed stop marker; a cancelled regenerate restores the
    /// displayed version. No version is committed either way.
    pub fn cancel(&mut self, transcript: &Transcript) -> Transcript {
        if self.is_done() {
            return transcript.clone();
        }
        self.end = StreamEnd::Cancelled;
        match self.mode {
            CommitMode::Replace => {
                self.content.push_str(STOPPED_SUFFIX);
                transcript
                    .replace_content(&self.target_id, self.content.clone())
                    .set_status(&self.target_id, MessageStatus::Complete)
            }
            CommitMode::AppendVersion => self.restore_displayed(transcript),
        }
    }

    /// Put the target message back to its selected version, so content
    /// and version list stay in sync after an abandoned regenerate.
    fn restore_displayed(&self, transcript: &Transcript) -> Transcript {
        let Some(message) = transcript.get(&self.target_id) else {
            return transcript.clone();
        };
        match message.versions.get(message.current_version) {
            Some(content) => transcript
                .replace_content(&self.target_id, content.clone())
                .set_status(&self.target_id, MessageStatus::Complete),
            None => transcript.clone(),
        }
    }

    pub fn finish(self) -> StreamOutcome {
        StreamOutcome {
            end: self.end,
            content: self.content,
            latency: self.latency,
            pending_session_id: self.pending_session_id,
            fallback_detected: self.fallback_detected,
            limit_reached: self.limit_reached,
            error_message: self.error_message,
        }
    }
}

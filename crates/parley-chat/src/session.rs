//! Active-session tracking and the sentinel-to-real handoff.
//!
//! A brand new conversation runs under the sentinel id until the backend
//! announces the stored session's real id mid-stream. Adoption is a
//! one-time transition; after it the sentinel never comes back except
//! through an explicit new-session reset.

use parley_api::{HistoryMessage, SessionRecord};
use serde::{Deserialize, Serialize};

use crate::transcript::{
    ChatMessage, FileInfo, Transcript, now_millis, parse_rfc3339_millis,
};

/// Placeholder id for a conversation the backend has not stored yet
pub const SENTINEL_SESSION_ID: &str = "1";

/// Greeting shown at the top of every fresh conversation
pub const WELCOME_TEXT: &str = "Hello! I'm your AI assistant. How can I help you today?";

/// Name given to sessions the user has not renamed
pub const DEFAULT_SESSION_NAME: &str = "How can I help you?";

const WELCOME_MESSAGE_ID: &str = "welcome";

/// Sidebar entry for one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub name: String,
    /// Last message content, shown as a preview line
    pub preview: String,
}

impl SessionSummary {
    fn welcome() -> Self {
        Self {
            id: SENTINEL_SESSION_ID.to_string(),
            name: DEFAULT_SESSION_NAME.to_string(),
            preview: WELCOME_TEXT.to_string(),
        }
    }

    pub fn from_record(record: &SessionRecord) -> Self {
        Self {
            id: record.id.clone(),
            name: record
                .session_name
                .clone()
                .unwrap_or_else(|| DEFAULT_SESSION_NAME.to_string()),
            preview: record.last_message().unwrap_or_default().to_string(),
        }
    }
}

/// Tracks the active session id, the session list, and the send gate
#[derive(Debug, Clone)]
pub struct SessionController {
    active_id: String,
    summaries: Vec<SessionSummary>,
    limit_reached: bool,
}

impl Default for SessionController {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionController {
    pub fn new() -> Self {
        Self {
            active_id: SENTINEL_SESSION_ID.to_string(),
            summaries: vec![SessionSummary::welcome()],
            limit_reached: false,
        }
    }

    pub fn active_id(&self) -> &str {
        &self.active_id
    }

    pub fn is_sentinel(&self) -> bool {
        self.active_id == SENTINEL_SESSION_ID
    }

    pub fn summaries(&self) -> &[SessionSummary] {
        &self.summaries
    }

    /// Sends are blocked once a limit error arrives, until a new session
    pub fn can_send(&self) -> bool {
        !self.limit_reached
    }

    pub fn set_limit_reached(&mut self, reached: bool) {
        self.limit_reached = reached;
    }

    /// Session id to attach to outgoing requests. The sentinel is never
    /// sent; the backend mints an id for the first turn.
    pub fn request_session_id(&self) -> Option<String> {
        if self.is_sentinel() {
            None
        } else {
            Some(self.active_id.clone())
        }
    }

    /// Replace the session list with fetched records, keeping the welcome
    /// entry on top while the sentinel session is active.
    pub fn load_summaries(&mut self, records: &[SessionRecord]) {
        let mut summaries = Vec::with_capacity(records.len() + 1);
        if self.is_sentinel() {
            summaries.push(SessionSummary::welcome());
        }
        summaries.extend(records.iter().map(SessionSummary::from_record));
        self.summaries = summaries;
    }

    /// One-time sentinel-to-real transition. The welcome entry becomes the
    /// stored session's entry. Returns false (no-op) when the active id is
    /// already real.
    pub fn adopt_session(&mut self, real_id: &str, preview: &str) -> bool {
        if !self.is_sentinel() {
            return false;
        }
        self.active_id = real_id.to_string();
        let adopted = SessionSummary {
            id: real_id.to_string(),
            name: DEFAULT_SESSION_NAME.to_string(),
            preview: preview.to_string(),
        };
        match self
            .summaries
            .iter()
            .position(|s| s.id == SENTINEL_SESSION_ID)
        {
            Some(pos) => self.summaries[pos] = adopted,
            None => self.summaries.insert(0, adopted),
        }
        true
    }

    /// Activate a stored session, building its transcript from fetched
    /// history. The welcome greeting is prepended, backdated to the first
    /// real message so ordering reads naturally.
    pub fn switch_to(
        &mut self,
        id: &str,
        history: &[HistoryMessage],
        limit_reached: bool,
    ) -> Transcript {
        if self.is_sentinel() && id != SENTINEL_SESSION_ID {
            self.summaries.retain(|s| s.id != SENTINEL_SESSION_ID);
        }
        self.active_id = id.to_string();
        self.limit_reached = limit_reached;

        let first_timestamp = history
            .first()
            .and_then(|m| m.timestamp.as_deref())
            .map(parse_rfc3339_millis)
            .unwrap_or_else(now_millis);

        let mut transcript = Transcript::default().append(ChatMessage::assistant(
            WELCOME_MESSAGE_ID,
            WELCOME_TEXT,
            first_timestamp,
        ));
        for (index, message) in history.iter().enumerate() {
            transcript = transcript.append(history_message(index, message));
        }
        transcript
    }

    /// Reset to a fresh sentinel conversation
    pub fn start_new(&mut self) -> Transcript {
        self.active_id = SENTINEL_SESSION_ID.to_string();
        self.limit_reached = false;
        if !self.summaries.iter().any(|s| s.id == SENTINEL_SESSION_ID) {
            self.summaries.insert(0, SessionSummary::welcome());
        }
        welcome_transcript()
    }

    /// Drop a session from the list. Returns true when the deleted session
    /// was the active one and the caller must pick a replacement.
    pub fn delete(&mut self, id: &str) -> bool {
        self.summaries.retain(|s| s.id != id);
        self.active_id == id
    }

    /// Replacement after deleting the active session: the first remaining
    /// stored session, or none (caller falls back to `start_new`).
    pub fn next_after_delete(&self) -> Option<&str> {
        self.summaries
            .iter()
            .find(|s| s.id != SENTINEL_SESSION_ID)
            .map(|s| s.id.as_str())
    }

    pub fn rename(&mut self, id: &str, name: &str) {
        if let Some(summary) = self.summaries.iter_mut().find(|s| s.id == id) {
            summary.name = name.to_string();
        }
    }

    /// Refresh a session's preview line after a new message
    pub fn touch_preview(&mut self, id: &str, last_message: &str) {
        if let Some(summary) = self.summaries.iter_mut().find(|s| s.id == id) {
            summary.preview = last_message.to_string();
        }
    }
}

/// Fresh transcript holding only the greeting
pub fn welcome_transcript() -> Transcript {
    Transcript::default().append(ChatMessage::assistant(
        WELCOME_MESSAGE_ID,
        WELCOME_TEXT,
        now_millis(),
    ))
}

/// Whether a message id belongs to the greeting (never regenerated)
pub fn is_welcome_message(id: &str) -> bool {
    id == WELCOME_MESSAGE_ID
}

fn history_message(index: usize, message: &HistoryMessage) -> ChatMessage {
    let id = message
        .id
        .clone()
        .unwrap_or_else(|| format!("history-{}", index));
    let timestamp = message
        .timestamp
        .as_deref()
        .map(parse_rfc3339_millis)
        .unwrap_or_else(now_millis);
    let mut built = if message.is_user() {
        let mut m = ChatMessage::user(id, message.content.clone());
        m.file = message.uploaded_file.as_ref().map(|f| FileInfo {
            name: f.name.clone(),
            size: f.size,
            media_type: f.media_type.clone(),
        });
        m
    } else {
        ChatMessage::assistant(id, message.content.clone(), timestamp)
    };
    built.timestamp = timestamp;
    built
}

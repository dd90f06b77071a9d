//! Transcript state: an ordered, versioned sequence of chat messages.
//!
//! All operations are pure: they return a new `Transcript`, preserving
//! order and every unrelated message unchanged. Consumers never observe
//! in-place mutation.

use serde::{Deserialize, Serialize};

/// Message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Lifecycle of a message's content.
///
/// An explicit tag the presentation layer switches on for the loading
/// state, instead of sniffing the content for a placeholder marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    /// Placeholder inserted at stream start, no content yet
    #[default]
    Pending,
    /// Chunks are arriving
    Streaming,
    /// Final content committed
    Complete,
    /// Replaced by an error message
    Error,
}

/// Descriptor of a file attached to a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    pub media_type: String,
}

/// Direction for version navigation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Prev,
    Next,
}

/// One message in the transcript.
///
/// Invariants: `versions.len() == version_timestamps.len()`; when versions
/// are present, `current_version < versions.len()` and `content` equals
/// `versions[current_version]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Caller-generated unique identifier
    pub id: String,
    pub role: Role,
    /// Currently displayed content
    pub content: String,
    /// Epoch millis of creation or of the displayed version
    pub timestamp: i64,
    pub file: Option<FileInfo>,
    /// Historical generation results; empty until the first commit
    #[serde(default)]
    pub versions: Vec<String>,
    #[serde(default)]
    pub version_timestamps: Vec<i64>,
    /// Index of the displayed version (0-based)
    #[serde(default)]
    pub current_version: usize,
    #[serde(default)]
    pub status: MessageStatus,
}

impl ChatMessage {
    /// Create a completed user message
    pub fn user(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::User,
            content: text.into(),
            timestamp: now_millis(),
            file: None,
            versions: vec![],
            version_timestamps: vec![],
            current_version: 0,
            status: MessageStatus::Complete,
        }
    }

    /// Create a completed user message with an attached file
    pub fn user_with_file(
        id: impl Into<String>,
        text: impl Into<String>,
        file: FileInfo,
    ) -> Self {
        Self {
            file: Some(file),
            ..Self::user(id, text)
        }
    }

    /// Create a completed assistant message without version history
    pub fn assistant(id: impl Into<String>, text: impl Into<String>, timestamp: i64) -> Self {
        Self {
            id: id.into(),
            role: Role::Assistant,
            content: text.into(),
            timestamp,
            file: None,
            versions: vec![],
            version_timestamps: vec![],
            current_version: 0,
            status: MessageStatus::Complete,
        }
    }

    /// Create a committed assistant message whose content is its single version
    pub fn assistant_final(
        id: impl Into<String>,
        text: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        let content: String = text.into();
        Self {
            versions: vec![content.clone()],
            version_timestamps: vec![timestamp],
            content,
            ..Self::assistant(id, "", timestamp)
        }
    }

    /// Create the empty placeholder inserted at stream start
    pub fn placeholder(id: impl Into<String>) -> Self {
        Self {
            status: MessageStatus::Pending,
            ..Self::assistant(id, "", now_millis())
        }
    }

    pub fn version_count(&self) -> usize {
        self.versions.len()
    }
}

/// Current epoch time in milliseconds
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Parse a backend RFC 3339 timestamp into epoch millis, falling back to
/// the local clock when unparseable.
pub(crate) fn parse_rfc3339_millis(value: &str) -> i64 {
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.timestamp_millis())
        .unwrap_or_else(|_| now_millis())
}

/// Ordered sequence of messages for the active session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
}

impl Transcript {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self { messages }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn get(&self, id: &str) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.messages.iter().position(|m| m.id == id)
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Apply `f` to the message with the given id, leaving everything else
    /// untouched. Unknown ids return the sequence unchanged.
    fn update(&self, id: &str, f: impl FnOnce(&mut ChatMessage)) -> Transcript {
        let mut messages = self.messages.clone();
        if let Some(message) = messages.iter_mut().find(|m| m.id == id) {
            f(message);
        }
        Transcript { messages }
    }

    /// Append a message at the end
    pub fn append(&self, message: ChatMessage) -> Transcript {
        let mut messages = self.messages.clone();
        messages.push(message);
        Transcript { messages }
    }

    /// Remove a message (used to roll back an optimistic user turn)
    pub fn remove(&self, id: &str) -> Transcript {
        Transcript {
            messages: self
                .messages
                .iter()
                .filter(|m| m.id != id)
                .cloned()
                .collect(),
        }
    }

    /// Replace displayed content, leaving versions and status untouched
    pub fn replace_content(&self, id: &str, content: impl Into<String>) -> Transcript {
        let content = content.into();
        self.update(id, |m| m.content = content)
    }

    /// Append to displayed content (the cancellation marker path)
    pub fn append_content(&self, id: &str, suffix: &str) -> Transcript {
        self.update(id, |m| m.content.push_str(suffix))
    }

    pub fn set_status(&self, id: &str, status: MessageStatus) -> Transcript {
        self.update(id, |m| m.status = status)
    }

    /// Commit final content as the message's single version
    pub fn commit_final(&self, id: &str, content: impl Into<String>, timestamp: i64) -> Transcript {
        let content = content.into();
        self.update(id, |m| {
            m.versions = vec![content.clone()];
            m.version_timestamps = vec![timestamp];
            m.current_version = 0;
            m.content = content;
            m.timestamp = timestamp;
            m.status = MessageStatus::Complete;
        })
    }

    /// Append a new version, selecting it.
    ///
    /// Append-only: prior versions never change. A message without version
    /// history is seeded from its current content first, so the first
    /// regenerate yields two navigable versions.
    pub fn add_version(&self, id: &str, content: impl Into<String>, timestamp: i64) -> Transcript {
        let content = content.into();
        self.update(id, |m| {
            if m.versions.is_empty() {
                m.versions.push(m.content.clone());
                m.version_timestamps.push(m.timestamp);
            }
            m.versions.push(content.clone());
            m.version_timestamps.push(timestamp);
            m.current_version = m.versions.len() - 1;
            m.content = content;
            m.timestamp = timestamp;
            m.status = MessageStatus::Complete;
        })
    }

    /// Seed the version list from current content when empty. Called before
    /// a streamed regenerate overwrites the displayed content.
    pub fn seed_versions(&self, id: &str) -> Transcript {
        self.update(id, |m| {
            if m.versions.is_empty() {
                m.versions.push(m.content.clone());
                m.version_timestamps.push(m.timestamp);
                m.current_version = 0;
            }
        })
    }

    /// Move the displayed version by one, clamped at both ends (no-op at
    /// either boundary), syncing content and timestamp to the selection.
    pub fn navigate_version(&self, id: &str, direction: Direction) -> Transcript {
        self.update(id, |m| {
            if m.versions.len() <= 1 {
                return;
            }
            let current = m.current_version;
            let target = match direction {
                Direction::Prev => current.saturating_sub(1),
                Direction::Next => (current + 1).min(m.versions.len() - 1),
            };
            if target == current {
                return;
            }
            m.current_version = target;
            m.content = m.versions[target].clone();
            m.timestamp = m.version_timestamps[target];
        })
    }
}

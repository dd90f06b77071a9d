//! Events the controller broadcasts to its front end

use serde::{Deserialize, Serialize};

use crate::transcript::ChatMessage;

/// Updates emitted while the controller runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// A message was appended (user turn or assistant placeholder)
    MessageStart { message: ChatMessage },
    /// A streamed message's content changed
    MessageUpdate { message: ChatMessage },
    /// A message reached its final state for this generation
    MessageEnd { message: ChatMessage },
    /// The backend assigned a real id to the sentinel conversation
    SessionAdopted { session_id: String },
    /// The local model failed and the selection moved to a cloud model
    FallbackTriggered { from: String, to: String },
    /// Sends are blocked for this session
    LimitReached { message: String },
    Error { message: String },
}

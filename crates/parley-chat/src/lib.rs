//! parley-chat: conversation state and streaming orchestration
//!
//! This crate folds the backend's event stream into a versioned transcript,
//! tracks the active session (sentinel to real-id handoff included), and
//! coordinates retry/regenerate flows that append versions instead of
//! overwriting history.

pub mod backend;
pub mod controller;
pub mod error;
pub mod events;
pub mod fallback;
pub mod handle;
pub mod reducer;
pub mod retry;
pub mod session;
pub mod transcript;

pub use backend::ChatBackend;
pub use controller::{ChatConfig, ChatController, ModelSelection, ModelStore};
pub use error::{Error, Result};
pub use events::ChatEvent;
pub use handle::ChatHandle;
pub use reducer::{CommitMode, StreamEnd, StreamOutcome, StreamReducer};
pub use session::{SENTINEL_SESSION_ID, SessionController, SessionSummary};
pub use transcript::{ChatMessage, Direction, FileInfo, MessageStatus, Role, Transcript};

//! parley-api: Typed client for the chat backend
//!
//! This crate wraps the backend's HTTP surface (model listing, chat
//! send/stream, session CRUD, profile) behind typed request and response
//! shapes, including the decoded event stream for `/chat/stream`.

pub mod client;
pub mod error;
pub mod stream;
pub mod types;

pub use client::{BackendClient, TRANSPORT_FAILURE_TEXT};
pub use error::{Error, Result};
pub use stream::{StreamEvent, StreamEventStream};
pub use types::*;

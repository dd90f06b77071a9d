//! Error types for parley-chat

use thiserror::Error;

/// Result type alias using parley-chat Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during chat operations
#[derive(Error, Debug)]
pub enum Error {
    /// An error from the backend API layer
    #[error(transparent)]
    Api(#[from] parley_api::Error),

    /// Sends are blocked until a new session is started
    #[error("Message limit reached for this session")]
    LimitReached,

    /// No model is currently selected
    #[error("No model selected")]
    NoModelSelected,

    /// A generic chat error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Check if this error is the distinguished limit-reached condition
    pub fn is_limit_reached(&self) -> bool {
        match self {
            Error::LimitReached => true,
            Error::Api(e) => e.is_limit_reached(),
            _ => false,
        }
    }
}

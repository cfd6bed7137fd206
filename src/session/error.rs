//! Session error taxonomy

use crate::chat::{EventError, FileError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    /// Transport or broker handshake failed on the initial connect
    #[error("could not connect to chat server: {0}")]
    ConnectFailure(String),

    #[error("invalid chat endpoint {url:?}: {reason}")]
    InvalidEndpoint { url: String, reason: String },

    /// `connect` was already called on this session
    #[error("session already started")]
    AlreadyStarted,

    /// The session was disconnected and cannot be reused
    #[error("session is closed")]
    Closed,

    #[error("not connected to chat server")]
    NotConnected,

    /// The socket rejected an outbound frame
    #[error("failed to publish: {0}")]
    PublishFailure(String),

    #[error(transparent)]
    File(#[from] FileError),

    #[error(transparent)]
    Event(#[from] EventError),
}

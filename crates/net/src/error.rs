//! Network error types

use std::io;

use crate::protocol::ErrorKind;

/// Network result type
pub type Result<T> = std::result::Result<T, Error>;

/// Network errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The server refused the connection (at capacity)
    #[error("Connection rejected: {0}")]
    Rejected(String),

    /// The server processed the request and answered with an error
    #[error("Remote error ({kind:?}): {message}")]
    Remote { kind: ErrorKind, message: String },
}

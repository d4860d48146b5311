//! Error types for badgesync core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A batch was refused before any write because one of its events is unusable
    #[error("Malformed event at position {position}: {reason}")]
    MalformedEvent { position: usize, reason: String },

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Could not generate a unique key after {attempts} attempts")]
    KeyExhausted { attempts: u32 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn not_found(kind: &str, id: impl std::fmt::Display) -> Self {
        Error::NotFound(format!("{} '{}'", kind, id))
    }

    pub fn malformed(position: usize, reason: impl Into<String>) -> Self {
        Error::MalformedEvent {
            position,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

//! Error types for tgm

use thiserror::Error;

/// The main error type for tgm operations
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// A side's external event source failed. Always fatal for the bridge.
    #[error("{side} source failed: {reason}")]
    Source { side: String, reason: String },

    /// An outbound action invoked by a handler failed
    #[error("Action error: {0}")]
    Action(String),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Build a fatal source error for the given side
    pub fn source_failed(side: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Error::Source {
            side: side.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error must take the bridge down
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Source { .. })
    }
}

/// A specialized Result type for tgm operations
pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

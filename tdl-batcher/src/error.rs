//! Application-wide error types.

use std::time::Duration;

use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    /// The request queue had nothing to hand out.
    #[error("request queue is empty")]
    EmptyQueue,

    /// The external transfer reported failure.
    #[error("transfer failed: {0}")]
    Transfer(String),

    #[error("transfer timed out after {0:?}")]
    TransferTimeout(Duration),

    /// A status update could not be delivered.
    #[error("notification failed: {0}")]
    Notification(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn transfer(msg: impl Into<String>) -> Self {
        Self::Transfer(msg.into())
    }

    pub fn notification(msg: impl Into<String>) -> Self {
        Self::Notification(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Whether this error came out of the transfer step itself.
    pub fn is_transfer_failure(&self) -> bool {
        matches!(self, Self::Transfer(_) | Self::TransferTimeout(_))
    }
}

impl From<process_utils::RunError> for Error {
    fn from(err: process_utils::RunError) -> Self {
        match err {
            process_utils::RunError::TimedOut(limit) => Self::TransferTimeout(limit),
            other => Self::Transfer(other.to_string()),
        }
    }
}

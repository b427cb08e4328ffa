//! Error types for autolog.
//!
//! The first four variants are the per-account failure taxonomy the tick
//! driver reasons about; the rest are plumbing that surfaces as
//! unexpected errors at the account boundary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A malformed account field. The account is skipped before any
    /// external call is made.
    #[error("invalid {field}: {message}")]
    Validation { field: &'static str, message: String },

    /// The ticketing service answered with a non-success status.
    #[error("{operation} failed with HTTP {status}: {message}")]
    Api {
        operation: &'static str,
        status: u16,
        message: String,
    },

    /// A stored credential could not be decrypted.
    #[error("credential decryption failed: {0}")]
    Decryption(String),

    /// A computed share fell outside the accepted worklog bounds.
    #[error("allocation of {seconds}s rejected: {message}")]
    Allocation { seconds: u64, message: String },

    #[error("config error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub(crate) fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Error::Validation {
            field,
            message: message.into(),
        }
    }

    /// Short label used for log fields and metric attributes.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation { .. } => "validation",
            Error::Api { .. } => "api",
            Error::Decryption(_) => "decryption",
            Error::Allocation { .. } => "allocation",
            _ => "unexpected",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

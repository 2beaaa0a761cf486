//! Service-boundary error type.
//!
//! Plumbing code returns `anyhow::Result`. Caller-facing operations of
//! [`Whisperer`](crate::service::Whisperer) return [`WhisperError`] so the
//! HTTP layer and the CLI can tell a rejected request from a missing record
//! without inspecting message text.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WhisperError {
    /// The request was malformed; maps to 400.
    #[error("{0}")]
    InvalidInput(String),
    /// The requested record does not exist or has expired; maps to 404.
    #[error("{0}")]
    NotFound(String),
    /// Anything else; maps to 500.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl WhisperError {
    pub fn invalid(message: impl Into<String>) -> Self {
        WhisperError::InvalidInput(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        WhisperError::NotFound(message.into())
    }
}

pub type WhisperResult<T> = std::result::Result<T, WhisperError>;

//! Typed errors for the relay library.
//!
//! Binary and configuration code use `anyhow`; everything the library hands
//! back to callers is one of the enums below.

use thiserror::Error;

/// Failures from a token store backend.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Token was empty or whitespace only.
    #[error("invalid device token: {0:?}")]
    InvalidToken(String),

    #[error("token store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Existing store content could not be decoded, or a record could not be encoded.
    #[error("token store is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("token database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Failures reported by a single provider attempt.
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// Network or protocol failure talking to the gateway.
    #[error("transport error: {0}")]
    Transport(String),

    /// Gateway answered but refused the message.
    #[error("rejected by gateway: {0}")]
    Rejected(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        ProviderError::Transport(e.to_string())
    }
}

/// Misuse of the dispatcher registry.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DispatchError {
    #[error("provider name must not be empty")]
    InvalidProviderName,
}

/// Failures loading a threshold override file.
#[derive(Error, Debug)]
pub enum ThresholdError {
    #[error("cannot read thresholds file: {0}")]
    Io(#[from] std::io::Error),

    #[error("thresholds file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("thresholds must be a JSON object keyed by parameter name")]
    NotAnObject,
}

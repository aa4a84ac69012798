//! REST error types

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced to callers of the REST client
#[derive(Debug, Error)]
pub enum RestError {
    #[error("Rate limited on {route}, retry after {retry_after:?} (global: {global})")]
    RateLimited {
        route: String,
        retry_after: Duration,
        global: bool,
    },

    #[error("Client error {status}: {message}")]
    Client { status: u16, message: String },

    #[error("Server error {status} after {attempts} attempts")]
    Server { status: u16, attempts: u32 },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl RestError {
    /// Whether the failure may succeed on a later attempt
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Server { .. } => true,
            Self::RateLimited { .. }
            | Self::Client { .. }
            | Self::InvalidUrl(_)
            | Self::Decode(_) => false,
        }
    }

    /// HTTP status carried by the error, if any
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RateLimited { .. } => Some(429),
            Self::Client { status, .. } | Self::Server { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for RestError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Result type alias for REST operations
pub type RestResult<T> = Result<T, RestError>;

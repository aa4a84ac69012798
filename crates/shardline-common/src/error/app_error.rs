//! Application error types
//!
//! Top-level error for binaries embedding the client.

use crate::config::ConfigError;
use crate::telemetry::TracingError;
use std::fmt;

/// Application-wide error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] TracingError),

    // Gateway errors
    #[error("Gateway error: {0}")]
    Gateway(String),

    // REST errors
    #[error("REST error: {0}")]
    Rest(String),

    // Internal errors
    #[error("Internal error")]
    Internal(#[source] anyhow::Error),
}

impl AppError {
    /// Get a stable error code for logs and exit reporting
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_ERROR",
            Self::Telemetry(_) => "TELEMETRY_ERROR",
            Self::Gateway(_) => "GATEWAY_ERROR",
            Self::Rest(_) => "REST_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Process exit code for this error
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 78,
            Self::Telemetry(_) | Self::Internal(_) => 70,
            Self::Gateway(_) | Self::Rest(_) => 69,
        }
    }

    /// Create a gateway error from any displayable error
    #[must_use]
    pub fn gateway(err: impl fmt::Display) -> Self {
        Self::Gateway(err.to_string())
    }

    /// Create a REST error from any displayable error
    #[must_use]
    pub fn rest(err: impl fmt::Display) -> Self {
        Self::Rest(err.to_string())
    }

    /// Create an internal error from any error
    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        Self::Internal(err.into())
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;

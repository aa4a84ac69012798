//! Gateway error types

use crate::protocol::CloseCode;
use crate::transport::TransportError;
use shardline_core::CoreError;
use thiserror::Error;

/// Errors raised by shards and the shard manager
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Gateway closed the connection: {0}")]
    FatalClose(CloseCode),

    #[error("Invalid shard configuration: {0}")]
    InvalidShard(#[from] CoreError),

    #[error("Shard manager already started")]
    AlreadyStarted,

    #[error("Failed to encode payload: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GatewayError {
    /// Whether the shard must stop instead of reconnecting
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationFailed | Self::FatalClose(_) | Self::InvalidShard(_)
        )
    }

    /// Map a close code received from the server, if it ends the shard
    #[must_use]
    pub fn from_close(code: CloseCode) -> Option<Self> {
        match code {
            CloseCode::AuthenticationFailed => Some(Self::AuthenticationFailed),
            code if code.is_fatal() => Some(Self::FatalClose(code)),
            _ => None,
        }
    }
}

/// Result type alias for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

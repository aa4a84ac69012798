//! Core errors - invalid value objects

use thiserror::Error;

/// Errors raised while constructing core value objects
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("Invalid shard {index} of {total}")]
    InvalidShard { index: u32, total: u32 },

    #[error("Invalid snowflake: {0}")]
    InvalidSnowflake(String),

    #[error("Invalid emoji: {0}")]
    InvalidEmoji(String),
}

//! `GET /gateway/bot` response

use serde::Deserialize;
use std::time::Duration;

/// Recommended gateway settings for this bot
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GatewayBotInfo {
    pub url: String,
    pub shards: u32,
    pub session_start_limit: SessionStartLimit,
}

/// Identify budget for the current 24h window
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionStartLimit {
    pub total: u32,
    pub remaining: u32,
    /// Milliseconds until the budget resets
    pub reset_after: u64,
    pub max_concurrency: u32,
}

impl SessionStartLimit {
    #[must_use]
    pub fn reset_after(&self) -> Duration {
        Duration::from_millis(self.reset_after)
    }
}

//! Handshake payloads

use serde::{Deserialize, Serialize};
use shardline_core::ShardId;

/// Payload for op 10 (Hello)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloPayload {
    /// Heartbeat interval in milliseconds
    pub heartbeat_interval: u64,
}

/// Payload for op 2 (Identify)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifyPayload {
    pub token: String,
    pub properties: IdentifyProperties,
    pub shard: ShardId,
    pub intents: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub large_threshold: Option<u8>,
}

/// Connection properties reported in Identify
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifyProperties {
    pub os: String,
    pub browser: String,
    pub device: String,
}

impl IdentifyProperties {
    /// Properties describing this library on the current OS
    #[must_use]
    pub fn library(name: &str) -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            browser: name.to_string(),
            device: name.to_string(),
        }
    }
}

impl Default for IdentifyProperties {
    fn default() -> Self {
        Self::library("shardline")
    }
}

/// Payload for op 4 (Resume)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumePayload {
    pub token: String,
    pub session_id: String,
    /// Last sequence number received
    pub seq: u64,
}

/// Body of the READY dispatch
///
/// Only the fields the shard needs; the full payload is forwarded untouched.
#[derive(Debug, Clone, Deserialize)]
pub struct ReadyPayload {
    #[serde(default)]
    pub v: u8,
    pub session_id: String,
    #[serde(default)]
    pub resume_gateway_url: Option<String>,
    #[serde(default)]
    pub shard: Option<ShardId>,
}

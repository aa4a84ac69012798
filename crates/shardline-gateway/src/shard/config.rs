//! Shard configuration

use crate::protocol::IdentifyProperties;
use shardline_common::ClientConfig;
use std::fmt;
use std::time::Duration;

/// Settings shared by every shard of a manager
#[derive(Clone)]
pub struct ShardConfig {
    pub token: String,
    /// Default gateway endpoint, used unless resuming
    pub gateway_url: String,
    pub version: u8,
    pub intents: u64,
    pub large_threshold: Option<u8>,
    pub properties: IdentifyProperties,
    /// Bound on opening the connection (TCP, TLS, WebSocket upgrade)
    pub connect_timeout: Duration,
    /// Bound on waiting for Hello after connecting
    pub hello_timeout: Duration,
    /// Bound on waiting for READY or RESUMED after Identify or Resume
    pub ready_timeout: Duration,
    pub reconnect_base: Duration,
    pub reconnect_max: Duration,
}

impl ShardConfig {
    /// Config with defaults for everything but the credential
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            gateway_url: "wss://gateway.discord.gg".to_string(),
            version: 10,
            intents: 513,
            large_threshold: Some(50),
            properties: IdentifyProperties::default(),
            connect_timeout: Duration::from_secs(10),
            hello_timeout: Duration::from_secs(20),
            ready_timeout: Duration::from_secs(30),
            reconnect_base: Duration::from_secs(1),
            reconnect_max: Duration::from_secs(60),
        }
    }

    /// Connection URL with version and encoding query parameters
    #[must_use]
    pub fn connect_url(&self, resume_url: Option<&str>) -> String {
        let base = resume_url.unwrap_or(&self.gateway_url).trim_end_matches('/');
        format!("{base}/?v={}&encoding=json", self.version)
    }
}

impl From<&ClientConfig> for ShardConfig {
    fn from(config: &ClientConfig) -> Self {
        let gateway = &config.gateway;
        Self {
            token: config.token.clone(),
            gateway_url: gateway.url.clone(),
            version: gateway.version,
            intents: gateway.intents,
            connect_timeout: gateway.connect_timeout(),
            hello_timeout: gateway.hello_timeout(),
            ready_timeout: gateway.ready_timeout(),
            reconnect_base: gateway.reconnect_base(),
            reconnect_max: gateway.reconnect_max(),
            ..Self::new(String::new())
        }
    }
}

impl fmt::Debug for ShardConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardConfig")
            .field("token", &"[redacted]")
            .field("gateway_url", &self.gateway_url)
            .field("version", &self.version)
            .field("intents", &self.intents)
            .field("connect_timeout", &self.connect_timeout)
            .field("hello_timeout", &self.hello_timeout)
            .field("ready_timeout", &self.ready_timeout)
            .finish_non_exhaustive()
    }
}

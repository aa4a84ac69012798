//! Client configuration structs
//!
//! Loads configuration from environment variables (and an optional `.env` file).

use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Main client configuration
#[derive(Clone, Deserialize)]
pub struct ClientConfig {
    pub app: AppSettings,
    /// Bot credential used for Identify, Resume and REST authorization
    pub token: String,
    pub gateway: GatewaySettings,
    pub rest: RestSettings,
}

/// General application settings
#[derive(Debug, Clone, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default)]
    pub env: Environment,
}

/// Environment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    #[must_use]
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }
}

impl FromStr for Environment {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "production" => Ok(Self::Production),
            "staging" => Ok(Self::Staging),
            "development" => Ok(Self::Development),
            _ => Err(()),
        }
    }
}

/// How many shards to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ShardCount {
    /// Ask the REST API for the recommended count
    #[default]
    Auto,
    /// Fixed total shard count
    Fixed(u32),
}

impl FromStr for ShardCount {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("auto") {
            return Ok(Self::Auto);
        }
        match s.parse::<u32>() {
            Ok(0) | Err(_) => Err(()),
            Ok(n) => Ok(Self::Fixed(n)),
        }
    }
}

/// Gateway connection and supervision settings
#[derive(Debug, Clone, Deserialize)]
pub struct GatewaySettings {
    pub url: String,
    pub version: u8,
    pub intents: u64,
    pub shard_count: ShardCount,
    pub identify_spacing_ms: u64,
    pub identify_max_concurrency: u32,
    pub connect_timeout_ms: u64,
    pub hello_timeout_ms: u64,
    pub ready_timeout_ms: u64,
    pub reconnect_base_ms: u64,
    pub reconnect_max_ms: u64,
    pub max_rapid_restarts: u32,
    pub restart_window_ms: u64,
    pub event_buffer: usize,
}

impl GatewaySettings {
    #[must_use]
    pub fn identify_spacing(&self) -> Duration {
        Duration::from_millis(self.identify_spacing_ms)
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    #[must_use]
    pub fn hello_timeout(&self) -> Duration {
        Duration::from_millis(self.hello_timeout_ms)
    }

    #[must_use]
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    #[must_use]
    pub fn reconnect_base(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_ms)
    }

    #[must_use]
    pub fn reconnect_max(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_ms)
    }

    #[must_use]
    pub fn restart_window(&self) -> Duration {
        Duration::from_millis(self.restart_window_ms)
    }
}

/// REST client settings
#[derive(Debug, Clone, Deserialize)]
pub struct RestSettings {
    pub base_url: String,
    pub global_limit: u32,
    pub max_retries: u32,
    pub user_agent: String,
}

// Default value functions
fn default_app_name() -> String {
    "shardline".to_string()
}

fn default_gateway_url() -> String {
    "wss://gateway.discord.gg".to_string()
}

fn default_rest_base_url() -> String {
    "https://discord.com/api/v10/".to_string()
}

fn default_user_agent() -> String {
    format!(
        "DiscordBot (https://github.com/shardline/shardline, {})",
        env!("CARGO_PKG_VERSION")
    )
}

const DEFAULT_GATEWAY_VERSION: u8 = 10;
// GUILDS | GUILD_MESSAGES
const DEFAULT_INTENTS: u64 = 513;
const DEFAULT_IDENTIFY_SPACING_MS: u64 = 5_000;
const DEFAULT_IDENTIFY_MAX_CONCURRENCY: u32 = 1;
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_HELLO_TIMEOUT_MS: u64 = 20_000;
const DEFAULT_READY_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_RECONNECT_BASE_MS: u64 = 1_000;
const DEFAULT_RECONNECT_MAX_MS: u64 = 60_000;
const DEFAULT_MAX_RAPID_RESTARTS: u32 = 5;
const DEFAULT_RESTART_WINDOW_MS: u64 = 60_000;
const DEFAULT_EVENT_BUFFER: usize = 1024;
const DEFAULT_REST_GLOBAL_LIMIT: u32 = 50;
const DEFAULT_REST_MAX_RETRIES: u32 = 3;

/// Read an optional variable, falling back to `default` when unset
fn parse_or<T, F>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name, raw)),
        None => Ok(default),
    }
}

impl ClientConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if required environment variables are missing or malformed
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token = lookup("BOT_TOKEN")
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::MissingVar("BOT_TOKEN"))?;

        Ok(Self {
            app: AppSettings {
                name: lookup("APP_NAME").unwrap_or_else(default_app_name),
                env: parse_or(&lookup, "APP_ENV", Environment::default())?,
            },
            token,
            gateway: GatewaySettings {
                url: lookup("GATEWAY_URL").unwrap_or_else(default_gateway_url),
                version: parse_or(&lookup, "GATEWAY_VERSION", DEFAULT_GATEWAY_VERSION)?,
                intents: parse_or(&lookup, "GATEWAY_INTENTS", DEFAULT_INTENTS)?,
                shard_count: parse_or(&lookup, "SHARD_COUNT", ShardCount::Auto)?,
                identify_spacing_ms: parse_or(
                    &lookup,
                    "IDENTIFY_SPACING_MS",
                    DEFAULT_IDENTIFY_SPACING_MS,
                )?,
                identify_max_concurrency: parse_or(
                    &lookup,
                    "IDENTIFY_MAX_CONCURRENCY",
                    DEFAULT_IDENTIFY_MAX_CONCURRENCY,
                )?,
                connect_timeout_ms: parse_or(
                    &lookup,
                    "CONNECT_TIMEOUT_MS",
                    DEFAULT_CONNECT_TIMEOUT_MS,
                )?,
                hello_timeout_ms: parse_or(&lookup, "HELLO_TIMEOUT_MS", DEFAULT_HELLO_TIMEOUT_MS)?,
                ready_timeout_ms: parse_or(&lookup, "READY_TIMEOUT_MS", DEFAULT_READY_TIMEOUT_MS)?,
                reconnect_base_ms: parse_or(
                    &lookup,
                    "RECONNECT_BASE_MS",
                    DEFAULT_RECONNECT_BASE_MS,
                )?,
                reconnect_max_ms: parse_or(&lookup, "RECONNECT_MAX_MS", DEFAULT_RECONNECT_MAX_MS)?,
                max_rapid_restarts: parse_or(
                    &lookup,
                    "MAX_RAPID_RESTARTS",
                    DEFAULT_MAX_RAPID_RESTARTS,
                )?,
                restart_window_ms: parse_or(
                    &lookup,
                    "RESTART_WINDOW_MS",
                    DEFAULT_RESTART_WINDOW_MS,
                )?,
                event_buffer: parse_or(&lookup, "EVENT_BUFFER", DEFAULT_EVENT_BUFFER)?,
            },
            rest: RestSettings {
                base_url: lookup("REST_BASE_URL").unwrap_or_else(default_rest_base_url),
                global_limit: parse_or(&lookup, "REST_GLOBAL_LIMIT", DEFAULT_REST_GLOBAL_LIMIT)?,
                max_retries: parse_or(&lookup, "REST_MAX_RETRIES", DEFAULT_REST_MAX_RETRIES)?,
                user_agent: lookup("REST_USER_AGENT").unwrap_or_else(default_user_agent),
            },
        })
        .and_then(Self::validate)
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.gateway.identify_max_concurrency == 0 {
            return Err(ConfigError::InvalidValue(
                "IDENTIFY_MAX_CONCURRENCY",
                "0".to_string(),
            ));
        }
        if self.gateway.event_buffer == 0 {
            return Err(ConfigError::InvalidValue("EVENT_BUFFER", "0".to_string()));
        }
        if self.gateway.reconnect_base_ms > self.gateway.reconnect_max_ms {
            return Err(ConfigError::InvalidValue(
                "RECONNECT_BASE_MS",
                self.gateway.reconnect_base_ms.to_string(),
            ));
        }
        Ok(self)
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("app", &self.app)
            .field("token", &"<redacted>")
            .field("gateway", &self.gateway)
            .field("rest", &self.rest)
            .finish()
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}

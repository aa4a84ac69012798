//! Tracing and logging setup
//!
//! A gateway client logs every frame at `trace` and every state change at
//! `info`. The WebSocket, TLS and HTTP stacks underneath are far chattier, so
//! unless `RUST_LOG` says otherwise they are held at `warn`.

use crate::config::Environment;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
    EnvFilter,
};

/// Targets held at `warn` unless `RUST_LOG` overrides them
const QUIET_TARGETS: [&str; 5] = [
    "tungstenite",
    "tokio_tungstenite",
    "rustls",
    "hyper_util",
    "reqwest",
];

/// Tracing configuration options
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Level for the client's own targets
    pub level: Level,
    /// One JSON object per line instead of human-readable output
    pub json: bool,
    /// Log span open/close (shard and REST request spans)
    pub span_events: bool,
    pub file_line: bool,
    pub thread_names: bool,
    pub thread_ids: bool,
    /// Extra `target=level` directives appended to the defaults
    pub directives: Vec<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json: false,
            span_events: false,
            file_line: true,
            thread_names: false,
            thread_ids: false,
            directives: Vec::new(),
        }
    }
}

impl TracingConfig {
    /// Debug output with span events, for local runs
    #[must_use]
    pub fn development() -> Self {
        Self {
            level: Level::DEBUG,
            span_events: true,
            thread_names: true,
            ..Self::default()
        }
    }

    /// JSON lines for log shippers
    #[must_use]
    pub fn production() -> Self {
        Self {
            json: true,
            file_line: false,
            ..Self::default()
        }
    }

    /// Preset matching the deployment environment
    #[must_use]
    pub fn for_environment(env: Environment) -> Self {
        match env {
            Environment::Development => Self::development(),
            Environment::Staging => Self::default(),
            Environment::Production => Self::production(),
        }
    }

    /// Add a `target=level` directive
    #[must_use]
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    fn span_events(&self) -> FmtSpan {
        if self.span_events {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    }

    /// Filter string used when `RUST_LOG` is unset
    fn default_filter(&self) -> String {
        let level = self.level.to_string().to_lowercase();
        std::iter::once(level)
            .chain(QUIET_TARGETS.iter().map(|target| format!("{target}=warn")))
            .chain(self.directives.iter().cloned())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Initialize tracing with the default configuration
///
/// # Panics
/// Panics if a global subscriber is already set.
pub fn init_tracing() {
    init_tracing_with_config(TracingConfig::default());
}

/// Initialize tracing with a custom configuration
///
/// # Panics
/// Panics if a global subscriber is already set.
pub fn init_tracing_with_config(config: TracingConfig) {
    if let Err(e) = install(&config) {
        panic!("failed to initialize tracing: {e}");
    }
}

/// Like [`init_tracing`], but reports a second initialization as an error
pub fn try_init_tracing() -> Result<(), TracingError> {
    try_init_tracing_with_config(TracingConfig::default())
}

/// Like [`init_tracing_with_config`], but reports a second initialization as an error
pub fn try_init_tracing_with_config(config: TracingConfig) -> Result<(), TracingError> {
    install(&config).map_err(|_| TracingError::AlreadyInitialized)
}

fn install(config: &TracingConfig) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_filter()));
    let registry = tracing_subscriber::registry().with(filter);

    let layer = fmt::layer()
        .with_file(config.file_line)
        .with_line_number(config.file_line)
        .with_thread_names(config.thread_names)
        .with_thread_ids(config.thread_ids)
        .with_span_events(config.span_events());

    if config.json {
        registry.with(layer.json()).try_init()
    } else {
        registry.with(layer).try_init()
    }
}

/// Tracing initialization errors
#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    #[error("Tracing subscriber already initialized")]
    AlreadyInitialized,
}

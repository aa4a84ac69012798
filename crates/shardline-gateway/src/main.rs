//! Shardline gateway entry point
//!
//! Run with:
//! ```bash
//! BOT_TOKEN=... cargo run -p shardline-gateway
//! ```
//!
//! Configuration is loaded from environment variables (and `.env`).

use shardline_common::{
    try_init_tracing_with_config, AppError, AppResult, ClientConfig, ShardCount, TracingConfig,
};
use shardline_gateway::{
    Delivery, EventBus, EventReceiver, GateConfig, GatewayEvent, IdentifyGate, SessionStore,
    ShardConfig, ShardEvent, ShardManager, SupervisorConfig, TungsteniteTransport,
};
use shardline_rest::RestClient;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!(error = %e, code = e.error_code(), "Gateway client failed");
        eprintln!("{e}");
        std::process::exit(e.exit_code());
    }
}

async fn run() -> AppResult<()> {
    let config = ClientConfig::from_env()?;

    try_init_tracing_with_config(TracingConfig::for_environment(config.app.env))?;

    info!(
        app = %config.app.name,
        env = ?config.app.env,
        gateway = %config.gateway.url,
        "Configuration loaded"
    );

    let rest = RestClient::new(&config.rest, &config.token).map_err(AppError::rest)?;

    let mut gate_config = GateConfig::from(&config.gateway);
    let total = match config.gateway.shard_count {
        ShardCount::Fixed(total) => total,
        ShardCount::Auto => {
            let info = rest.gateway_bot().await.map_err(AppError::rest)?;
            let limit = &info.session_start_limit;
            info!(
                shards = info.shards,
                remaining = limit.remaining,
                max_concurrency = limit.max_concurrency,
                "Using recommended shard count"
            );
            if limit.remaining < info.shards {
                warn!(
                    remaining = limit.remaining,
                    reset_after = ?limit.reset_after(),
                    "Session start budget is low"
                );
            }
            gate_config.max_concurrency = limit.max_concurrency.max(1);
            info.shards
        }
    };

    let bus = EventBus::new(config.gateway.event_buffer);
    let manager = ShardManager::with_parts(
        ShardConfig::from(&config),
        SupervisorConfig::from(&config.gateway),
        Arc::new(TungsteniteTransport::new()),
        Arc::new(bus.clone()),
        IdentifyGate::new(gate_config),
        SessionStore::new(),
    );

    let consumer = tokio::spawn(log_events(bus.subscribe()));
    manager.start(total).map_err(AppError::gateway)?;

    tokio::signal::ctrl_c().await.map_err(AppError::internal)?;
    info!("Received Ctrl-C");

    manager.shutdown().await;
    consumer.abort();
    Ok(())
}

async fn log_events(mut events: EventReceiver) {
    while let Some(delivery) = events.recv().await {
        match delivery {
            Delivery::Event(GatewayEvent::Dispatch(dispatch)) => {
                debug!(
                    shard = %dispatch.shard,
                    seq = dispatch.sequence,
                    event = %dispatch.event_type,
                    "Dispatch"
                );
            }
            Delivery::Event(GatewayEvent::Shard { shard, event }) => match event {
                ShardEvent::Fatal { .. } => error!(shard = %shard, "{event}"),
                ShardEvent::Discontinuity { .. } => warn!(shard = %shard, "{event}"),
                _ => info!(shard = %shard, "{event}"),
            },
            Delivery::Lagged(missed) => warn!(missed, "Event log fell behind"),
        }
    }
}

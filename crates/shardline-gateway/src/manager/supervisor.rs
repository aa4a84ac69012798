//! Shard supervision
//!
//! Each shard runs in its own task under a supervisor task. A shard that
//! returns (shutdown or fatal close) is not restarted. A shard whose task
//! panics is rebuilt from `Disconnected`, unless it has failed too many times
//! in a row, in which case it is left `Closed` and reported as fatal.

use crate::events::ShardEvent;
use crate::shard::{Shard, ShardContext, ShardState, StateTracker};
use shardline_common::GatewaySettings;
use shardline_core::ShardId;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Restart limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// Restarts allowed before giving up on a shard
    pub max_rapid_restarts: u32,
    /// Failures further apart than this are not counted as consecutive
    pub restart_window: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_rapid_restarts: 5,
            restart_window: Duration::from_secs(60),
        }
    }
}

impl From<&GatewaySettings> for SupervisorConfig {
    fn from(settings: &GatewaySettings) -> Self {
        Self {
            max_rapid_restarts: settings.max_rapid_restarts,
            restart_window: settings.restart_window(),
        }
    }
}

/// Tracks consecutive failures inside the restart window
#[derive(Debug, Default)]
struct FailureWindow {
    consecutive: u32,
    last: Option<Instant>,
}

impl FailureWindow {
    fn record(&mut self, now: Instant, window: Duration) -> u32 {
        self.consecutive = match self.last {
            Some(last) if now.saturating_duration_since(last) <= window => self.consecutive + 1,
            _ => 1,
        };
        self.last = Some(now);
        self.consecutive
    }
}

pub(super) async fn supervise(
    id: ShardId,
    ctx: ShardContext,
    state: StateTracker,
    config: SupervisorConfig,
    restarts: Arc<AtomicU32>,
) {
    let mut failures = FailureWindow::default();

    loop {
        let shard = Shard::new(id, ctx.clone(), state.clone());
        match tokio::spawn(shard.run()).await {
            Ok(Ok(())) => return,
            Ok(Err(e)) => {
                error!(shard = %id, error = %e, "Shard will not be restarted");
                return;
            }
            Err(e) if e.is_cancelled() => {
                state.set(ShardState::Closed);
                return;
            }
            Err(e) => {
                let consecutive = failures.record(Instant::now(), config.restart_window);
                if consecutive > config.max_rapid_restarts {
                    error!(shard = %id, failures = consecutive, "Shard keeps failing, giving up");
                    state.set(ShardState::Closed);
                    ctx.sink.on_shard_event(
                        id,
                        ShardEvent::Fatal {
                            reason: format!(
                                "task failed {consecutive} times within {:?}",
                                config.restart_window
                            ),
                        },
                    );
                    return;
                }

                let total = restarts.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(shard = %id, error = %e, restarts = total, "Shard task failed, restarting");
                state.set(ShardState::Disconnected);

                if *ctx.shutdown.borrow() {
                    info!(shard = %id, "Shutdown requested, not restarting");
                    state.set(ShardState::Closed);
                    return;
                }
            }
        }
    }
}

//! Shard states

use crate::events::{EventSink, ShardEvent};
use shardline_core::ShardId;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// Connection lifecycle of one shard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ShardState {
    #[default]
    Disconnected,
    AwaitingIdentifySlot,
    Connecting,
    AwaitingHello,
    Authenticating,
    Ready,
    Reconnecting,
    /// Terminal: shut down, or stopped on an unrecoverable error
    Closed,
}

impl ShardState {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::AwaitingIdentifySlot => "AwaitingIdentifySlot",
            Self::Connecting => "Connecting",
            Self::AwaitingHello => "AwaitingHello",
            Self::Authenticating => "Authenticating",
            Self::Ready => "Ready",
            Self::Reconnecting => "Reconnecting",
            Self::Closed => "Closed",
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for ShardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Publishes a shard's state to watchers and the event sink
///
/// Outlives individual [`Shard`](super::Shard) instances so a restarted shard
/// keeps the same watch channel.
#[derive(Clone)]
pub struct StateTracker {
    shard: ShardId,
    sender: Arc<watch::Sender<ShardState>>,
    sink: Arc<dyn EventSink>,
}

impl StateTracker {
    pub fn new(shard: ShardId, sink: Arc<dyn EventSink>) -> Self {
        let (sender, _) = watch::channel(ShardState::Disconnected);
        Self {
            shard,
            sender: Arc::new(sender),
            sink,
        }
    }

    #[must_use]
    pub fn get(&self) -> ShardState {
        *self.sender.borrow()
    }

    #[must_use]
    pub fn watch(&self) -> watch::Receiver<ShardState> {
        self.sender.subscribe()
    }

    /// Move to `to`, reporting the change if it is one
    pub fn set(&self, to: ShardState) {
        let from = self.sender.send_replace(to);
        if from != to {
            debug!(shard = %self.shard, from = %from, to = %to, "Shard state changed");
            self.sink
                .on_shard_event(self.shard, ShardEvent::StateChanged { from, to });
        }
    }
}

//! Shard manager

use super::supervisor::{supervise, SupervisorConfig};
use crate::error::GatewayError;
use crate::events::EventSink;
use crate::identify::{GateConfig, IdentifyGate};
use crate::session::SessionStore;
use crate::shard::{ShardConfig, ShardContext, ShardState, StateTracker};
use crate::transport::GatewayTransport;
use parking_lot::Mutex;
use shardline_core::ShardId;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

struct ShardSlot {
    id: ShardId,
    state: StateTracker,
    restarts: Arc<AtomicU32>,
    task: Option<JoinHandle<()>>,
}

/// Owns every shard for one total shard count
pub struct ShardManager {
    config: Arc<ShardConfig>,
    supervisor: SupervisorConfig,
    transport: Arc<dyn GatewayTransport>,
    sink: Arc<dyn EventSink>,
    gate: IdentifyGate,
    sessions: SessionStore,
    shutdown: watch::Sender<bool>,
    shards: Mutex<Vec<ShardSlot>>,
}

impl ShardManager {
    /// Manager with its own session store and a default identify gate
    pub fn new(
        config: ShardConfig,
        transport: Arc<dyn GatewayTransport>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self::with_parts(
            config,
            SupervisorConfig::default(),
            transport,
            sink,
            IdentifyGate::new(GateConfig::default()),
            SessionStore::new(),
        )
    }

    /// Manager over an existing gate and session store
    pub fn with_parts(
        config: ShardConfig,
        supervisor: SupervisorConfig,
        transport: Arc<dyn GatewayTransport>,
        sink: Arc<dyn EventSink>,
        gate: IdentifyGate,
        sessions: SessionStore,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            config: Arc::new(config),
            supervisor,
            transport,
            sink,
            gate,
            sessions,
            shutdown,
            shards: Mutex::new(Vec::new()),
        }
    }

    /// Start shards `0..total`, each in its own supervised task
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, total: u32) -> Result<(), GatewayError> {
        let mut shards = self.shards.lock();
        if !shards.is_empty() {
            return Err(GatewayError::AlreadyStarted);
        }

        let ids = (0..total.max(1))
            .map(|index| ShardId::new(index, total))
            .collect::<Result<Vec<_>, _>>()?;

        for id in ids {
            let state = StateTracker::new(id, Arc::clone(&self.sink));
            let restarts = Arc::new(AtomicU32::new(0));
            let task = tokio::spawn(supervise(
                id,
                self.context(),
                state.clone(),
                self.supervisor,
                Arc::clone(&restarts),
            ));
            shards.push(ShardSlot {
                id,
                state,
                restarts,
                task: Some(task),
            });
        }

        info!(total, "Shards started");
        Ok(())
    }

    /// Signal every shard to close and wait for all of them
    pub async fn shutdown(&self) {
        info!("Shutting down shards");
        self.shutdown.send_replace(true);

        let tasks: Vec<_> = self
            .shards
            .lock()
            .iter_mut()
            .filter_map(|slot| slot.task.take())
            .collect();

        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Shard supervisor failed");
            }
        }
        info!("All shards closed");
    }

    #[must_use]
    pub fn state(&self, shard: ShardId) -> Option<ShardState> {
        self.with_slot(shard, |slot| slot.state.get())
    }

    /// Current state of every shard, ordered by index
    #[must_use]
    pub fn states(&self) -> Vec<(ShardId, ShardState)> {
        self.shards
            .lock()
            .iter()
            .map(|slot| (slot.id, slot.state.get()))
            .collect()
    }

    #[must_use]
    pub fn watch_state(&self, shard: ShardId) -> Option<watch::Receiver<ShardState>> {
        self.with_slot(shard, |slot| slot.state.watch())
    }

    /// Times a shard's task has been restarted after failing
    #[must_use]
    pub fn restart_count(&self, shard: ShardId) -> Option<u32> {
        self.with_slot(shard, |slot| slot.restarts.load(Ordering::Relaxed))
    }

    /// Total shard count, once started
    #[must_use]
    pub fn total(&self) -> Option<u32> {
        self.shards.lock().first().map(|slot| slot.id.total())
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    #[must_use]
    pub fn gate(&self) -> &IdentifyGate {
        &self.gate
    }

    fn context(&self) -> ShardContext {
        ShardContext {
            config: Arc::clone(&self.config),
            transport: Arc::clone(&self.transport),
            gate: self.gate.clone(),
            sessions: self.sessions.clone(),
            sink: Arc::clone(&self.sink),
            shutdown: self.shutdown.subscribe(),
        }
    }

    fn with_slot<T>(&self, shard: ShardId, f: impl FnOnce(&ShardSlot) -> T) -> Option<T> {
        self.shards
            .lock()
            .get(shard.index() as usize)
            .filter(|slot| slot.id == shard)
            .map(f)
    }
}

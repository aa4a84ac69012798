//! Identify gate
//!
//! Shards queue here before sending Identify. Grants go out in arrival order,
//! never closer together than `spacing`, and never with more than
//! `max_concurrency` tickets outstanding. A ticket is returned when the shard
//! reaches Ready or gives up on the connection.

use parking_lot::Mutex;
use shardline_common::GatewaySettings;
use shardline_core::ShardId;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{sleep, Instant};
use tracing::{debug, trace};

/// Gate limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateConfig {
    /// Minimum time between two grants
    pub spacing: Duration,
    /// Maximum tickets outstanding at once
    pub max_concurrency: u32,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            spacing: Duration::from_secs(5),
            max_concurrency: 1,
        }
    }
}

impl From<&GatewaySettings> for GateConfig {
    fn from(settings: &GatewaySettings) -> Self {
        Self {
            spacing: settings.identify_spacing(),
            max_concurrency: settings.identify_max_concurrency.max(1),
        }
    }
}

#[derive(Debug, Default)]
struct GateState {
    queue: VecDeque<u64>,
    next_waiter: u64,
    in_flight: u32,
    last_grant: Option<Instant>,
}

impl GateState {
    /// `Ok` grants; `Err(Some(d))` means retry after `d`; `Err(None)` means
    /// wait until something changes
    fn try_grant(
        &mut self,
        waiter: u64,
        now: Instant,
        config: &GateConfig,
    ) -> Result<(), Option<Duration>> {
        if self.queue.front() != Some(&waiter) || self.in_flight >= config.max_concurrency {
            return Err(None);
        }
        if let Some(last) = self.last_grant {
            let ready_at = last + config.spacing;
            if now < ready_at {
                return Err(Some(ready_at - now));
            }
        }
        self.queue.pop_front();
        self.in_flight += 1;
        self.last_grant = Some(now);
        Ok(())
    }
}

#[derive(Debug)]
struct GateInner {
    config: GateConfig,
    state: Mutex<GateState>,
    changed: Notify,
}

impl GateInner {
    fn release(&self) {
        {
            let mut state = self.state.lock();
            state.in_flight = state.in_flight.saturating_sub(1);
        }
        self.changed.notify_waiters();
    }
}

/// Process-wide identify admission controller
#[derive(Debug, Clone)]
pub struct IdentifyGate {
    inner: Arc<GateInner>,
}

impl IdentifyGate {
    #[must_use]
    pub fn new(config: GateConfig) -> Self {
        Self {
            inner: Arc::new(GateInner {
                config,
                state: Mutex::new(GateState::default()),
                changed: Notify::new(),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> GateConfig {
        self.inner.config
    }

    /// Wait for a turn to identify
    ///
    /// Cancel safe: dropping the future removes the caller from the queue.
    pub async fn acquire(&self, shard: ShardId) -> IdentifyTicket {
        let enqueued_at = Instant::now();
        let waiter = {
            let mut state = self.inner.state.lock();
            let id = state.next_waiter;
            state.next_waiter += 1;
            state.queue.push_back(id);
            id
        };
        trace!(shard = %shard, waiter, "Queued for identify");

        let mut guard = QueueGuard {
            inner: &self.inner,
            waiter,
            granted: false,
        };

        loop {
            let notified = self.inner.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let outcome = self
                .inner
                .state
                .lock()
                .try_grant(waiter, Instant::now(), &self.inner.config);

            match outcome {
                Ok(()) => {
                    guard.granted = true;
                    // The next waiter is now at the head of the queue
                    self.inner.changed.notify_waiters();
                    let granted_at = Instant::now();
                    debug!(
                        shard = %shard,
                        waited_ms = (granted_at - enqueued_at).as_millis() as u64,
                        "Identify slot granted"
                    );
                    return IdentifyTicket {
                        inner: Arc::clone(&self.inner),
                        shard,
                        enqueued_at,
                        granted_at,
                    };
                }
                Err(Some(delay)) => {
                    tokio::select! {
                        () = sleep(delay) => {}
                        () = &mut notified => {}
                    }
                }
                Err(None) => notified.await,
            }
        }
    }

    /// Tickets currently outstanding
    #[must_use]
    pub fn in_flight(&self) -> u32 {
        self.inner.state.lock().in_flight
    }

    /// Shards waiting for a ticket
    #[must_use]
    pub fn queued(&self) -> usize {
        self.inner.state.lock().queue.len()
    }
}

impl Default for IdentifyGate {
    fn default() -> Self {
        Self::new(GateConfig::default())
    }
}

/// Removes an abandoned waiter from the queue
struct QueueGuard<'a> {
    inner: &'a GateInner,
    waiter: u64,
    granted: bool,
}

impl Drop for QueueGuard<'_> {
    fn drop(&mut self) {
        if self.granted {
            return;
        }
        {
            let mut state = self.inner.state.lock();
            state.queue.retain(|w| *w != self.waiter);
        }
        self.inner.changed.notify_waiters();
    }
}

/// Permission to send one Identify
///
/// Holds a concurrency slot until released or dropped.
#[derive(Debug)]
pub struct IdentifyTicket {
    inner: Arc<GateInner>,
    shard: ShardId,
    enqueued_at: Instant,
    granted_at: Instant,
}

impl IdentifyTicket {
    #[must_use]
    pub fn shard(&self) -> ShardId {
        self.shard
    }

    #[must_use]
    pub fn enqueued_at(&self) -> Instant {
        self.enqueued_at
    }

    #[must_use]
    pub fn granted_at(&self) -> Instant {
        self.granted_at
    }

    /// Give the slot back
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for IdentifyTicket {
    fn drop(&mut self) {
        trace!(shard = %self.shard, "Identify slot released");
        self.inner.release();
    }
}

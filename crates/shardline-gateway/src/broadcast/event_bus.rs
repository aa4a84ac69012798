//! Broadcast event bus
//!
//! Each subscriber gets its own bounded buffer. A subscriber that falls behind
//! loses the oldest events and is told how many it missed; shards never wait
//! on a slow subscriber.

use crate::events::{DispatchEvent, EventSink, GatewayEvent, ShardEvent};
use serde_json::Value;
use shardline_core::ShardId;
use tokio::sync::broadcast;
use tracing::{trace, warn};

/// What a subscriber receives
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Event(GatewayEvent),
    /// This many events were dropped because the subscriber fell behind
    Lagged(u64),
}

/// [`EventSink`] that fans events out over a broadcast channel
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<GatewayEvent>,
}

impl EventBus {
    /// Create a bus with `capacity` buffered events per subscriber
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    #[must_use]
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            inner: self.sender.subscribe(),
        }
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    fn publish(&self, event: GatewayEvent) {
        if self.sender.send(event).is_err() {
            trace!("No event subscribers");
        }
    }
}

impl EventSink for EventBus {
    fn on_dispatch(&self, shard: ShardId, sequence: u64, event_type: &str, payload: Value) {
        self.publish(GatewayEvent::Dispatch(DispatchEvent {
            shard,
            sequence,
            event_type: event_type.to_string(),
            payload,
        }));
    }

    fn on_shard_event(&self, shard: ShardId, event: ShardEvent) {
        self.publish(GatewayEvent::Shard { shard, event });
    }
}

/// One subscriber's view of the bus
#[derive(Debug)]
pub struct EventReceiver {
    inner: broadcast::Receiver<GatewayEvent>,
}

impl EventReceiver {
    /// Next event, a lag report, or `None` once every bus handle is gone
    pub async fn recv(&mut self) -> Option<Delivery> {
        match self.inner.recv().await {
            Ok(event) => Some(Delivery::Event(event)),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, "Event subscriber lagged behind");
                Some(Delivery::Lagged(missed))
            }
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv); `None` when nothing is buffered
    pub fn try_recv(&mut self) -> Option<Delivery> {
        match self.inner.try_recv() {
            Ok(event) => Some(Delivery::Event(event)),
            Err(broadcast::error::TryRecvError::Lagged(missed)) => Some(Delivery::Lagged(missed)),
            Err(broadcast::error::TryRecvError::Empty | broadcast::error::TryRecvError::Closed) => {
                None
            }
        }
    }
}

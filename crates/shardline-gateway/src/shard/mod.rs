//! Shard state machine
//!
//! One [`Shard`] drives one persistent connection. It owns its connection and
//! heartbeat timer; the only state it shares is the identify gate, the session
//! store and the event sink.

mod backoff;
mod config;
mod heartbeat;
mod runner;
mod state;

pub use backoff::Backoff;
pub use config::ShardConfig;
pub use heartbeat::{Beat, Heartbeater};
pub use runner::{Shard, ShardContext};
pub use state::{ShardState, StateTracker};

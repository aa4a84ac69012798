//! # shardline-gateway
//!
//! Sharded gateway client.
//!
//! Each shard runs its own task driving one persistent connection through
//! Hello, Identify/Resume, heartbeating and reconnects. Fresh identifies are
//! serialized through a shared [`IdentifyGate`]; resume state lives in a
//! shared [`SessionStore`]. [`ShardManager`] starts the shards and restarts
//! any whose task dies unexpectedly.
//!
//! ## Modules
//!
//! - `protocol`: opcodes, close codes, envelope and payloads
//! - `transport`: the connection abstraction and its tokio-tungstenite implementation
//! - `session`: per-shard resume state
//! - `identify`: identify admission control
//! - `shard`: the per-shard state machine
//! - `manager`: shard startup, shutdown and supervision
//! - `events` / `broadcast`: event delivery to the application

pub mod broadcast;
pub mod error;
pub mod events;
pub mod identify;
pub mod manager;
pub mod protocol;
pub mod session;
pub mod shard;
pub mod transport;

pub use broadcast::{Delivery, EventBus, EventReceiver};
pub use error::{GatewayError, GatewayResult};
pub use events::{DispatchEvent, EventSink, GatewayEvent, SessionKind, ShardEvent};
pub use identify::{GateConfig, IdentifyGate, IdentifyTicket};
pub use manager::{ShardManager, SupervisorConfig};
pub use protocol::{CloseCode, GatewayMessage, OpCode};
pub use session::{Session, SessionStore};
pub use shard::{Shard, ShardConfig, ShardContext, ShardState};
pub use transport::{
    GatewayConnection, GatewayFrame, GatewayTransport, TransportError, TungsteniteTransport,
};

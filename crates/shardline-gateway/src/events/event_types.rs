//! Event types

use crate::shard::ShardState;
use serde_json::Value;
use shardline_core::ShardId;
use std::fmt;

/// How a session reached Ready
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    /// New session after Identify; local state must be rebuilt
    Fresh,
    /// Previous session continued after Resume; nothing was missed
    Resumed,
}

/// Lifecycle notifications for one shard
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShardEvent {
    StateChanged { from: ShardState, to: ShardState },
    SessionStarted { kind: SessionKind },
    /// The session was dropped; events after `last_sequence` are lost
    Discontinuity { last_sequence: Option<u64> },
    /// The shard stopped and will not be restarted
    Fatal { reason: String },
}

impl fmt::Display for ShardEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StateChanged { from, to } => write!(f, "state {from} -> {to}"),
            Self::SessionStarted { kind } => write!(f, "session started ({kind:?})"),
            Self::Discontinuity { last_sequence } => match last_sequence {
                Some(seq) => write!(f, "discontinuity after sequence {seq}"),
                None => write!(f, "discontinuity"),
            },
            Self::Fatal { reason } => write!(f, "fatal: {reason}"),
        }
    }
}

/// A dispatch received by a shard
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchEvent {
    pub shard: ShardId,
    pub sequence: u64,
    pub event_type: String,
    pub payload: Value,
}

/// Anything a shard reports to the application
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    Dispatch(DispatchEvent),
    Shard { shard: ShardId, event: ShardEvent },
}

impl GatewayEvent {
    #[must_use]
    pub fn shard(&self) -> ShardId {
        match self {
            Self::Dispatch(dispatch) => dispatch.shard,
            Self::Shard { shard, .. } => *shard,
        }
    }
}

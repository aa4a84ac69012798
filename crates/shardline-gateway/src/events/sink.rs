//! Event sink
//!
//! Shards hand every accepted dispatch and lifecycle change to a sink. Calls
//! happen on the shard's receive loop, so implementations must not block.

use super::ShardEvent;
use serde_json::Value;
use shardline_core::ShardId;

/// Receiver of shard output
pub trait EventSink: Send + Sync {
    /// A dispatch accepted in sequence order
    fn on_dispatch(&self, shard: ShardId, sequence: u64, event_type: &str, payload: Value);

    /// A lifecycle change
    fn on_shard_event(&self, _shard: ShardId, _event: ShardEvent) {}
}

//! Shard management
//!
//! Starts one supervised task per shard and shuts them all down together.

mod shard_manager;
mod supervisor;

pub use shard_manager::ShardManager;
pub use supervisor::SupervisorConfig;

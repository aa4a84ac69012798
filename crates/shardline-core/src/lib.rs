//! # shardline-core
//!
//! Value objects shared by the gateway and REST crates.
//! This crate has no runtime or network dependencies.

pub mod entities;
pub mod error;
pub mod value_objects;

// Re-export commonly used types at crate root
pub use entities::Emoji;
pub use error::CoreError;
pub use value_objects::{ShardId, Snowflake, SnowflakeParseError};

//! Shard identifier
//!
//! A shard covers the guilds whose id maps onto its index for a fixed total count.

use crate::error::CoreError;
use crate::value_objects::Snowflake;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Shard identifier `(index, total)`
///
/// Invariant: `index < total`, `total > 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "[u32; 2]", into = "[u32; 2]")]
pub struct ShardId {
    index: u32,
    total: u32,
}

impl ShardId {
    /// Create a validated shard id
    pub fn new(index: u32, total: u32) -> Result<Self, CoreError> {
        if total == 0 || index >= total {
            return Err(CoreError::InvalidShard { index, total });
        }
        Ok(Self { index, total })
    }

    /// Shard that receives events for a guild
    pub fn for_guild(guild_id: Snowflake, total: u32) -> Result<Self, CoreError> {
        if total == 0 {
            return Err(CoreError::InvalidShard { index: 0, total });
        }
        let index = guild_id.epoch_millis() % u64::from(total);
        Self::new(index as u32, total)
    }

    /// Shard index
    #[inline]
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// Total shard count
    #[inline]
    pub const fn total(&self) -> u32 {
        self.total
    }

    /// Wire form used by the Identify payload
    #[must_use]
    pub const fn as_array(&self) -> [u32; 2] {
        [self.index, self.total]
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.index, self.total)
    }
}

impl TryFrom<[u32; 2]> for ShardId {
    type Error = CoreError;

    fn try_from([index, total]: [u32; 2]) -> Result<Self, Self::Error> {
        Self::new(index, total)
    }
}

impl From<ShardId> for [u32; 2] {
    fn from(id: ShardId) -> Self {
        id.as_array()
    }
}

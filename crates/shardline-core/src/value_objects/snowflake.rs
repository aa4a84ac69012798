//! Snowflake ids
//!
//! The top 42 bits of an id are milliseconds since [`Snowflake::EPOCH`]; the
//! remaining 22 bits only make ids unique. Shard routing uses the millisecond
//! part, see [`ShardId::for_guild`](crate::ShardId::for_guild).

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// 64-bit id assigned by the remote API
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Snowflake(u64);

impl Snowflake {
    /// 2015-01-01T00:00:00Z in Unix milliseconds
    pub const EPOCH: u64 = 1_420_070_400_000;

    /// Bits below the timestamp
    const TIMESTAMP_SHIFT: u32 = 22;

    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Milliseconds since [`Self::EPOCH`]
    #[must_use]
    pub const fn epoch_millis(self) -> u64 {
        self.0 >> Self::TIMESTAMP_SHIFT
    }

    /// Unix milliseconds at which the id was minted
    #[must_use]
    pub const fn unix_millis(self) -> u64 {
        self.epoch_millis() + Self::EPOCH
    }

    pub fn created_at(self) -> Option<chrono::DateTime<chrono::Utc>> {
        let millis = i64::try_from(self.unix_millis()).ok()?;
        chrono::DateTime::from_timestamp_millis(millis)
    }

    pub fn parse(s: &str) -> Result<Self, SnowflakeParseError> {
        s.parse()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("not a snowflake: {0:?}")]
pub struct SnowflakeParseError(String);

impl FromStr for Snowflake {
    type Err = SnowflakeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>()
            .map(Self)
            .map_err(|_| SnowflakeParseError(s.to_string()))
    }
}

impl fmt::Display for Snowflake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<u64> for Snowflake {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<Snowflake> for u64 {
    fn from(id: Snowflake) -> Self {
        id.0
    }
}

/// Written as a string, like the API does, so JavaScript clients keep precision
impl Serialize for Snowflake {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Payloads carry ids as strings, but some older fields use bare integers
#[derive(Deserialize)]
#[serde(untagged)]
enum WireId {
    Number(u64),
    Text(String),
}

impl<'de> Deserialize<'de> for Snowflake {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match WireId::deserialize(deserializer)? {
            WireId::Number(id) => Ok(Self(id)),
            WireId::Text(text) => text.parse().map_err(de::Error::custom),
        }
    }
}

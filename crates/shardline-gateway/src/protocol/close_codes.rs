//! Gateway close codes
//!
//! Every 4xxx code maps to one [`Recovery`]: resume the session, start a new
//! one, or stop the shard.

use std::fmt;

/// What a shard does after the server closes with a given code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Reconnect and resume the session
    Resume,
    /// Reconnect with a fresh Identify
    Reidentify,
    /// Reconnecting will not help
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum CloseCode {
    UnknownError = 4000,
    UnknownOpcode = 4001,
    DecodeError = 4002,
    NotAuthenticated = 4003,
    AuthenticationFailed = 4004,
    AlreadyAuthenticated = 4005,
    InvalidSequence = 4007,
    RateLimited = 4008,
    SessionTimeout = 4009,
    InvalidShard = 4010,
    ShardingRequired = 4011,
    InvalidApiVersion = 4012,
    InvalidIntents = 4013,
    DisallowedIntents = 4014,
}

impl CloseCode {
    /// Normal closure; the server drops the session
    pub const NORMAL: u16 = 1000;
    /// Code a client closes with when it intends to resume
    pub const RESUMABLE: u16 = 4000;

    const ALL: [Self; 14] = [
        Self::UnknownError,
        Self::UnknownOpcode,
        Self::DecodeError,
        Self::NotAuthenticated,
        Self::AuthenticationFailed,
        Self::AlreadyAuthenticated,
        Self::InvalidSequence,
        Self::RateLimited,
        Self::SessionTimeout,
        Self::InvalidShard,
        Self::ShardingRequired,
        Self::InvalidApiVersion,
        Self::InvalidIntents,
        Self::DisallowedIntents,
    ];

    #[must_use]
    pub const fn code(self) -> u16 {
        self as u16
    }

    #[must_use]
    pub const fn recovery(self) -> Recovery {
        match self {
            Self::AuthenticationFailed
            | Self::InvalidShard
            | Self::ShardingRequired
            | Self::InvalidApiVersion
            | Self::InvalidIntents
            | Self::DisallowedIntents => Recovery::Stop,
            Self::InvalidSequence | Self::SessionTimeout => Recovery::Reidentify,
            _ => Recovery::Resume,
        }
    }

    #[must_use]
    pub const fn is_fatal(self) -> bool {
        matches!(self.recovery(), Recovery::Stop)
    }

    #[must_use]
    pub const fn invalidates_session(self) -> bool {
        matches!(self.recovery(), Recovery::Reidentify)
    }

    fn reason(self) -> &'static str {
        match self {
            Self::UnknownError => "unknown error",
            Self::UnknownOpcode => "unknown opcode",
            Self::DecodeError => "undecodable payload",
            Self::NotAuthenticated => "payload before Identify",
            Self::AuthenticationFailed => "authentication failed",
            Self::AlreadyAuthenticated => "identified twice",
            Self::InvalidSequence => "bad resume sequence",
            Self::RateLimited => "sending too fast",
            Self::SessionTimeout => "session timed out",
            Self::InvalidShard => "invalid shard",
            Self::ShardingRequired => "sharding required",
            Self::InvalidApiVersion => "invalid API version",
            Self::InvalidIntents => "invalid intents",
            Self::DisallowedIntents => "disallowed intents",
        }
    }
}

impl TryFrom<u16> for CloseCode {
    type Error = u16;

    fn try_from(code: u16) -> Result<Self, u16> {
        Self::ALL
            .into_iter()
            .find(|close| close.code() == code)
            .ok_or(code)
    }
}

impl From<CloseCode> for u16 {
    fn from(close: CloseCode) -> Self {
        close.code()
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code(), self.reason())
    }
}

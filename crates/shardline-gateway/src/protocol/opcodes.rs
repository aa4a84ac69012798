//! Gateway opcodes
//!
//! Every frame carries an `op` number. Some opcodes only travel one way, and
//! `Heartbeat` travels both: the client sends it on a timer, the server sends
//! it to ask for one immediately.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Which side may send an opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToServer,
    ServerToClient,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    Dispatch = 0,
    Heartbeat = 1,
    Identify = 2,
    PresenceUpdate = 3,
    Resume = 4,
    Reconnect = 7,
    RequestGuildMembers = 8,
    /// Payload is a bool: whether the session can still be resumed
    InvalidSession = 9,
    /// First frame on every connection, carries the heartbeat interval
    Hello = 10,
    HeartbeatAck = 11,
}

/// (opcode, direction, label)
static TABLE: [(OpCode, Direction, &str); 10] = [
    (OpCode::Dispatch, Direction::ServerToClient, "Dispatch"),
    (OpCode::Heartbeat, Direction::Both, "Heartbeat"),
    (OpCode::Identify, Direction::ClientToServer, "Identify"),
    (OpCode::PresenceUpdate, Direction::ClientToServer, "PresenceUpdate"),
    (OpCode::Resume, Direction::ClientToServer, "Resume"),
    (OpCode::Reconnect, Direction::ServerToClient, "Reconnect"),
    (OpCode::RequestGuildMembers, Direction::ClientToServer, "RequestGuildMembers"),
    (OpCode::InvalidSession, Direction::ServerToClient, "InvalidSession"),
    (OpCode::Hello, Direction::ServerToClient, "Hello"),
    (OpCode::HeartbeatAck, Direction::ServerToClient, "HeartbeatAck"),
];

impl OpCode {
    fn entry(self) -> &'static (OpCode, Direction, &'static str) {
        TABLE
            .iter()
            .find(|(op, _, _)| *op == self)
            .unwrap_or(&TABLE[0])
    }

    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub fn direction(self) -> Direction {
        self.entry().1
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        self.entry().2
    }

    #[must_use]
    pub fn sent_by_client(self) -> bool {
        self.direction() != Direction::ServerToClient
    }

    #[must_use]
    pub fn sent_by_server(self) -> bool {
        self.direction() != Direction::ClientToServer
    }
}

impl TryFrom<u8> for OpCode {
    type Error = u8;

    /// Unknown codes are handed back unchanged
    fn try_from(code: u8) -> Result<Self, u8> {
        TABLE
            .iter()
            .map(|(op, _, _)| *op)
            .find(|op| op.code() == code)
            .ok_or(code)
    }
}

impl Serialize for OpCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for OpCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = u8::deserialize(deserializer)?;
        Self::try_from(code).map_err(|code| de::Error::custom(format!("unknown opcode {code}")))
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label(), self.code())
    }
}

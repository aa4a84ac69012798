//! Gateway message envelope
//!
//! Every frame on the connection is a JSON object `{op, t, s, d}`.

use super::{HelloPayload, IdentifyPayload, OpCode, ReadyPayload, ResumePayload};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// One frame's worth of JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayMessage {
    pub op: OpCode,

    /// Event name, dispatches only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,

    /// Dispatch sequence number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,

    #[serde(default)]
    pub d: Value,
}

impl GatewayMessage {
    fn new(op: OpCode, d: Value) -> Self {
        Self {
            op,
            t: None,
            s: None,
            d,
        }
    }

    /// Heartbeat (op=1) carrying the last sequence seen, or null
    #[must_use]
    pub fn heartbeat(last_sequence: Option<u64>) -> Self {
        Self::new(OpCode::Heartbeat, last_sequence.map_or(Value::Null, Value::from))
    }

    /// Identify (op=2)
    pub fn identify(payload: &IdentifyPayload) -> Result<Self, serde_json::Error> {
        Ok(Self::new(OpCode::Identify, serde_json::to_value(payload)?))
    }

    /// Resume (op=4)
    pub fn resume(payload: &ResumePayload) -> Result<Self, serde_json::Error> {
        Ok(Self::new(OpCode::Resume, serde_json::to_value(payload)?))
    }

    // Server-side frames, built by test servers

    /// Dispatch (op=0)
    #[must_use]
    pub fn dispatch(event_type: impl Into<String>, sequence: u64, data: Value) -> Self {
        Self {
            op: OpCode::Dispatch,
            t: Some(event_type.into()),
            s: Some(sequence),
            d: data,
        }
    }

    /// Hello (op=10)
    #[must_use]
    pub fn hello(heartbeat_interval: u64) -> Self {
        Self::new(
            OpCode::Hello,
            serde_json::json!({ "heartbeat_interval": heartbeat_interval }),
        )
    }

    /// Heartbeat ACK (op=11)
    #[must_use]
    pub fn heartbeat_ack() -> Self {
        Self::new(OpCode::HeartbeatAck, Value::Null)
    }

    /// Reconnect (op=7)
    #[must_use]
    pub fn reconnect() -> Self {
        Self::new(OpCode::Reconnect, Value::Null)
    }

    /// Invalid Session (op=9)
    #[must_use]
    pub fn invalid_session(resumable: bool) -> Self {
        Self::new(OpCode::InvalidSession, Value::Bool(resumable))
    }

    /// Hello payload, if this is op=10
    #[must_use]
    pub fn as_hello(&self) -> Option<HelloPayload> {
        self.payload(self.op == OpCode::Hello)
    }

    /// READY body, if this is the READY dispatch
    #[must_use]
    pub fn as_ready(&self) -> Option<ReadyPayload> {
        self.payload(self.is_event("READY"))
    }

    /// Resumable flag, if this is op=9
    #[must_use]
    pub fn as_invalid_session(&self) -> Option<bool> {
        if self.op != OpCode::InvalidSession {
            return None;
        }
        Some(self.d.as_bool().unwrap_or(false))
    }

    /// Identify payload, if this is op=2
    #[must_use]
    pub fn as_identify(&self) -> Option<IdentifyPayload> {
        self.payload(self.op == OpCode::Identify)
    }

    /// Resume payload, if this is op=4
    #[must_use]
    pub fn as_resume(&self) -> Option<ResumePayload> {
        self.payload(self.op == OpCode::Resume)
    }

    /// Whether this is a dispatch of the given event type
    #[must_use]
    pub fn is_event(&self, event_type: &str) -> bool {
        self.op == OpCode::Dispatch && self.t.as_deref() == Some(event_type)
    }

    fn payload<T: DeserializeOwned>(&self, matches: bool) -> Option<T> {
        matches
            .then(|| T::deserialize(&self.d).ok())
            .flatten()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl fmt::Display for GatewayMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op {}", self.op)?;
        match (&self.t, self.s) {
            (Some(event), Some(seq)) => write!(f, " {event} #{seq}"),
            (Some(event), None) => write!(f, " {event}"),
            _ => Ok(()),
        }
    }
}

//! Identify admission control

mod gate;

pub use gate::{GateConfig, IdentifyGate, IdentifyTicket};

//! Events delivered to the application

mod event_types;
mod sink;

pub use event_types::{DispatchEvent, GatewayEvent, SessionKind, ShardEvent};
pub use sink::EventSink;

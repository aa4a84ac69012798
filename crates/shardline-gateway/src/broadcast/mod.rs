//! Event fan-out to application consumers

mod event_bus;

pub use event_bus::{Delivery, EventBus, EventReceiver};

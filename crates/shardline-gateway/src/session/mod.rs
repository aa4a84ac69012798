//! Session state
//!
//! Resume data for each shard, shared between shard restarts.

mod store;

pub use store::{Session, SessionStore};

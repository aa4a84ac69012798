//! Integration test utilities
//!
//! Scripted gateway servers, a mock HTTP transport, and fixtures for driving
//! the shard manager and REST client end to end without a network.

pub mod helpers;

pub use helpers::*;

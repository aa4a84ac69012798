//! Entities read from gateway and REST payloads

mod emoji;

pub use emoji::Emoji;

//! Gateway transport abstraction
//!
//! A shard only needs to connect, send frames and receive frames. The
//! connection is handed over as a split sink/stream pair so the receive loop
//! can poll the stream while the handlers write to the sink.

mod tungstenite;

pub use self::tungstenite::TungsteniteTransport;

use async_trait::async_trait;
use futures::{Sink, Stream};
use std::pin::Pin;
use thiserror::Error;

/// A frame on the persistent connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayFrame {
    /// JSON text frame
    Text(String),
    /// Close frame with an optional close code
    Close(Option<u16>),
}

/// Outbound half of a connection
pub type FrameSink = Pin<Box<dyn Sink<GatewayFrame, Error = TransportError> + Send>>;

/// Inbound half of a connection
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<GatewayFrame, TransportError>> + Send>>;

/// An open gateway connection
pub struct GatewayConnection {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl GatewayConnection {
    pub fn new(sink: FrameSink, stream: FrameStream) -> Self {
        Self { sink, stream }
    }
}

/// Connection-level errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Failed to connect: {0}")]
    Connect(String),

    #[error("Failed to send: {0}")]
    Send(String),

    #[error("Failed to receive: {0}")]
    Receive(String),

    #[error("Connection closed")]
    Closed,
}

/// Opens persistent connections to the gateway
#[async_trait]
pub trait GatewayTransport: Send + Sync {
    async fn connect(&self, url: &str) -> Result<GatewayConnection, TransportError>;
}

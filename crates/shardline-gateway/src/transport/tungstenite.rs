//! WebSocket transport backed by tokio-tungstenite

use super::{GatewayConnection, GatewayFrame, GatewayTransport, TransportError};
use async_trait::async_trait;
use futures_util::{future, SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace};

/// Production gateway transport over `wss://`
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteTransport;

impl TungsteniteTransport {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn into_message(frame: GatewayFrame) -> Message {
    match frame {
        GatewayFrame::Text(text) => Message::Text(text),
        GatewayFrame::Close(code) => Message::Close(code.map(|code| CloseFrame {
            code: WsCloseCode::from(code),
            reason: "".into(),
        })),
    }
}

fn from_message(message: Message) -> Option<GatewayFrame> {
    match message {
        Message::Text(text) => Some(GatewayFrame::Text(text)),
        Message::Binary(bytes) => match String::from_utf8(bytes) {
            Ok(text) => Some(GatewayFrame::Text(text)),
            Err(_) => {
                debug!("Dropping non-UTF-8 binary frame");
                None
            }
        },
        Message::Close(frame) => Some(GatewayFrame::Close(frame.map(|f| u16::from(f.code)))),
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => None,
    }
}

#[async_trait]
impl GatewayTransport for TungsteniteTransport {
    async fn connect(&self, url: &str) -> Result<GatewayConnection, TransportError> {
        let (socket, response) = connect_async(url)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        trace!(status = %response.status(), "WebSocket handshake complete");

        let (write, read) = socket.split();

        let sink = write
            .sink_map_err(|e| TransportError::Send(e.to_string()))
            .with(|frame: GatewayFrame| future::ready(Ok::<_, TransportError>(into_message(frame))));

        let stream = read.filter_map(|message| {
            future::ready(match message {
                Ok(message) => from_message(message).map(Ok),
                Err(e) => Some(Err(TransportError::Receive(e.to_string()))),
            })
        });

        Ok(GatewayConnection::new(Box::pin(sink), Box::pin(stream)))
    }
}

//! High-level REST client

mod gateway_bot;
mod rest_client;

pub use gateway_bot::{GatewayBotInfo, SessionStartLimit};
pub use rest_client::RestClient;

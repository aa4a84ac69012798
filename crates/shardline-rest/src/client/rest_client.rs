//! Rate-limited REST client

use super::GatewayBotInfo;
use crate::error::RestError;
use crate::http::{HttpTransport, ReqwestTransport, RestRequest, RestResponse};
use crate::ratelimit::{LimiterConfig, RestLimiter, RouteKey};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use reqwest::Method;
use serde::de::DeserializeOwned;
use shardline_common::RestSettings;
use shardline_core::{Emoji, Snowflake};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Bytes escaped in a reaction path segment; non-ASCII is always escaped
const REACTION_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Emoji as a single path segment, e.g. `%F0%9F%94%A5` or `LUL:42`
fn reaction_segment(emoji: &Emoji) -> String {
    utf8_percent_encode(&emoji.for_reaction(), REACTION_SEGMENT).to_string()
}

/// REST client; every call goes through one shared [`RestLimiter`]
#[derive(Clone)]
pub struct RestClient {
    limiter: Arc<RestLimiter>,
}

impl RestClient {
    /// Build a client over `reqwest` from settings
    pub fn new(settings: &RestSettings, token: &str) -> Result<Self, RestError> {
        let transport = ReqwestTransport::new(&settings.base_url, token, &settings.user_agent)?;
        Ok(Self::with_transport(
            Arc::new(transport),
            LimiterConfig::from(settings),
        ))
    }

    /// Build a client over any transport
    pub fn with_transport(transport: Arc<dyn HttpTransport>, config: LimiterConfig) -> Self {
        Self {
            limiter: Arc::new(RestLimiter::new(transport, config)),
        }
    }

    #[must_use]
    pub fn limiter(&self) -> &RestLimiter {
        &self.limiter
    }

    /// Send a request through the limiter
    pub async fn request(&self, request: &RestRequest) -> Result<RestResponse, RestError> {
        let route = RouteKey::new(&request.method, &request.path);
        debug!(route = %route, "Executing REST request");
        self.limiter.execute(&route, request).await
    }

    /// Send a request and decode its JSON body
    pub async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T, RestError> {
        let mut request = RestRequest::new(method, path);
        request.body = body;
        self.request(&request).await?.json()
    }

    /// Recommended shard count and identify budget
    #[instrument(skip(self))]
    pub async fn gateway_bot(&self) -> Result<GatewayBotInfo, RestError> {
        self.request_json(Method::GET, "gateway/bot", None).await
    }

    /// React to a message as the bot user
    #[instrument(skip(self, emoji), fields(emoji = %emoji.for_reaction()))]
    pub async fn add_reaction(
        &self,
        channel: Snowflake,
        message: Snowflake,
        emoji: &Emoji,
    ) -> Result<(), RestError> {
        let path = format!(
            "channels/{channel}/messages/{message}/reactions/{}/@me",
            reaction_segment(emoji)
        );
        self.request(&RestRequest::new(Method::PUT, path)).await?;
        Ok(())
    }
}

//! HTTP transports

use super::{RestRequest, RestResponse};
use crate::error::RestError;
use crate::ratelimit::RateLimitHeaders;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, Url};
use tracing::trace;

/// Request/response capability the limiter sends through
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: &RestRequest) -> Result<RestResponse, RestError>;
}

/// Production transport backed by `reqwest`
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    base_url: Url,
}

impl ReqwestTransport {
    /// Build a client that authenticates every request as a bot
    pub fn new(base_url: &str, token: &str, user_agent: &str) -> Result<Self, RestError> {
        let mut base_url =
            Url::parse(base_url).map_err(|e| RestError::InvalidUrl(format!("{base_url}: {e}")))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bot {token}"))
            .map_err(|_| RestError::Transport("token is not a valid header value".to_string()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(user_agent)
                .map_err(|_| RestError::Transport("invalid user agent".to_string()))?,
        );

        let client = Client::builder().default_headers(headers).build()?;
        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str) -> Result<Url, RestError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| RestError::InvalidUrl(format!("{path}: {e}")))
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &RestRequest) -> Result<RestResponse, RestError> {
        let url = self.url(&request.path)?;
        trace!(method = %request.method, %url, "Sending REST request");

        let mut builder = self.client.request(request.method.clone(), url);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(reason) = &request.audit_reason {
            builder = builder.header("X-Audit-Log-Reason", reason);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = RateLimitHeaders::parse(response.headers());
        let body = response.text().await?;

        Ok(RestResponse {
            status,
            headers,
            body,
        })
    }
}

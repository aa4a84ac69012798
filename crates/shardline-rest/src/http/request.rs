//! REST request and response primitives

use crate::error::RestError;
use crate::ratelimit::RateLimitHeaders;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

/// An outbound REST call, relative to the API base URL
#[derive(Debug, Clone)]
pub struct RestRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<serde_json::Value>,
    pub audit_reason: Option<String>,
}

impl RestRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            audit_reason: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    #[must_use]
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn with_audit_reason(mut self, reason: impl Into<String>) -> Self {
        self.audit_reason = Some(reason.into());
        self
    }
}

/// A received REST response
#[derive(Debug, Clone)]
pub struct RestResponse {
    pub status: u16,
    pub headers: RateLimitHeaders,
    pub body: String,
}

/// Body of a 429 response
#[derive(Debug, Deserialize)]
struct RateLimitBody {
    retry_after: f64,
    #[serde(default)]
    global: bool,
}

/// Body of any other error response
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl RestResponse {
    pub fn new(status: u16, headers: RateLimitHeaders, body: impl Into<String>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, RestError> {
        Ok(serde_json::from_str(&self.body)?)
    }

    /// Retry-after and global flag for a 429, header first then body
    #[must_use]
    pub fn rate_limit(&self) -> (Duration, bool) {
        let body: Option<RateLimitBody> = serde_json::from_str(&self.body).ok();
        let retry_after = self
            .headers
            .retry_after
            .or_else(|| {
                body.as_ref()
                    .filter(|b| b.retry_after.is_finite() && b.retry_after >= 0.0)
                    .map(|b| Duration::from_secs_f64(b.retry_after))
            })
            .unwrap_or(Duration::from_secs(1));
        let global = self.headers.is_global() || body.is_some_and(|b| b.global);
        (retry_after, global)
    }

    /// Human readable error message from the body
    #[must_use]
    pub fn error_message(&self) -> String {
        serde_json::from_str::<ErrorBody>(&self.body)
            .map(|b| b.message)
            .unwrap_or_else(|_| self.body.clone())
    }
}

//! # shardline-rest
//!
//! REST side of the client: every outbound call passes a per-route bucket and
//! a global bucket before it is sent, and is retried once on a 429.

pub mod client;
pub mod error;
pub mod http;
pub mod ratelimit;

pub use client::{GatewayBotInfo, RestClient, SessionStartLimit};
pub use error::{RestError, RestResult};
pub use http::{HttpTransport, ReqwestTransport, RestRequest, RestResponse};
pub use ratelimit::{
    BucketSnapshot, LimiterConfig, RateBucket, RateLimitHeaders, RateLimitScope, RestLimiter,
    RouteKey,
};

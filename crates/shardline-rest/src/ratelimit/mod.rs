//! Rate limiting
//!
//! Buckets keyed by route, a shared global bucket, and the limiter that gates
//! outbound requests on both.

mod bucket;
mod headers;
mod limiter;
mod route;

pub use bucket::{BucketSnapshot, RateBucket};
pub use headers::{RateLimitHeaders, RateLimitScope};
pub use limiter::{LimiterConfig, RestLimiter};
pub use route::RouteKey;

//! Rate limit response headers

use reqwest::header::HeaderMap;
use std::time::Duration;

/// Which limit a 429 was raised against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitScope {
    /// Per-route limit for this bot
    User,
    /// Account-wide limit across all routes
    Global,
    /// Per-resource limit shared with other clients
    Shared,
}

impl RateLimitScope {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Self::User),
            "global" => Some(Self::Global),
            "shared" => Some(Self::Shared),
            _ => None,
        }
    }
}

/// Rate limit state reported by the server on a response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateLimitHeaders {
    /// `x-ratelimit-limit`
    pub limit: Option<u32>,
    /// `x-ratelimit-remaining`
    pub remaining: Option<u32>,
    /// `x-ratelimit-reset-after`, or `x-ratelimit-reset` relative to now
    pub reset_after: Option<Duration>,
    /// `x-ratelimit-bucket`
    pub bucket: Option<String>,
    /// `x-ratelimit-global`
    pub global: bool,
    /// `x-ratelimit-scope`
    pub scope: Option<RateLimitScope>,
    /// `retry-after` (seconds)
    pub retry_after: Option<Duration>,
}

impl RateLimitHeaders {
    /// Parse from a reqwest header map
    #[must_use]
    pub fn parse(headers: &HeaderMap) -> Self {
        Self::from_lookup(|name| headers.get(name).and_then(|v| v.to_str().ok()))
    }

    /// Parse from any case-insensitive header lookup
    pub fn from_lookup<'a, F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<&'a str>,
    {
        let reset_after = lookup("x-ratelimit-reset-after")
            .and_then(parse_seconds)
            .or_else(|| lookup("x-ratelimit-reset").and_then(until_epoch_seconds));

        Self {
            limit: lookup("x-ratelimit-limit").and_then(|v| v.trim().parse().ok()),
            remaining: lookup("x-ratelimit-remaining").and_then(|v| v.trim().parse().ok()),
            reset_after,
            bucket: lookup("x-ratelimit-bucket").map(str::to_string),
            global: lookup("x-ratelimit-global").is_some_and(|v| v.eq_ignore_ascii_case("true")),
            scope: lookup("x-ratelimit-scope").and_then(RateLimitScope::parse),
            retry_after: lookup("retry-after").and_then(parse_seconds),
        }
    }

    /// True when the response carried any bucket information
    #[must_use]
    pub fn has_bucket_info(&self) -> bool {
        self.limit.is_some() || self.remaining.is_some() || self.reset_after.is_some()
    }

    /// Whether a 429 with these headers applies to every route
    #[must_use]
    pub fn is_global(&self) -> bool {
        self.global || self.scope == Some(RateLimitScope::Global)
    }
}

fn parse_seconds(value: &str) -> Option<Duration> {
    let secs: f64 = value.trim().parse().ok()?;
    (secs.is_finite() && secs >= 0.0).then(|| Duration::from_secs_f64(secs))
}

fn until_epoch_seconds(value: &str) -> Option<Duration> {
    let reset: f64 = value.trim().parse().ok()?;
    let now = chrono::Utc::now().timestamp_millis() as f64 / 1000.0;
    let secs = (reset - now).max(0.0);
    secs.is_finite().then(|| Duration::from_secs_f64(secs))
}

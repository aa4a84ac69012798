//! Route keys
//!
//! Requests that share a rate limit share a key. Ids in major-parameter
//! position (`channels/{id}`, `guilds/{id}`, `webhooks/{id}/{token}`) are part
//! of the key; every other id is templated away.

use reqwest::Method;
use std::fmt;

const MAJOR_PARAMETERS: [&str; 3] = ["channels", "guilds", "webhooks"];

/// Normalized identifier for a family of REST calls sharing one bucket
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteKey(String);

impl RouteKey {
    /// Derive the bucket key for a method and request path
    #[must_use]
    pub fn new(method: &Method, path: &str) -> Self {
        let path = path.split('?').next().unwrap_or_default().trim_matches('/');
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        let mut key = Vec::with_capacity(segments.len());
        for (i, segment) in segments.iter().enumerate() {
            let previous = i.checked_sub(1).map(|p| segments[p]);

            // Every emoji and user below a reaction shares the message bucket
            if previous == Some("reactions") {
                key.push(":reaction");
                break;
            }

            let is_major = i == 1 && previous.is_some_and(|p| MAJOR_PARAMETERS.contains(&p));
            let is_webhook_token = i == 2 && segments[0] == "webhooks";

            if is_major || is_webhook_token || !is_id(segment) {
                key.push(segment);
            } else {
                key.push(":id");
            }
        }

        Self(format!("{method} /{}", key.join("/")))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_id(segment: &str) -> bool {
    !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit())
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

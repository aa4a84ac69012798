//! REST rate limiter
//!
//! Every request takes one call from its route bucket and one from the global
//! bucket before it is sent. Bucket locks are only held to read or write a
//! bucket, never across a send or a sleep.

use super::{BucketSnapshot, RateBucket, RateLimitHeaders, RouteKey};
use crate::error::RestError;
use crate::http::{HttpTransport, RestRequest, RestResponse};
use dashmap::DashMap;
use parking_lot::Mutex;
use shardline_common::RestSettings;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

/// Limiter tuning
#[derive(Debug, Clone)]
pub struct LimiterConfig {
    /// Requests allowed per `global_window` across all routes
    pub global_limit: u32,
    pub global_window: Duration,
    /// Retries for 5xx and network failures
    pub max_retries: u32,
    pub retry_base: Duration,
    pub retry_max: Duration,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            global_limit: 50,
            global_window: Duration::from_secs(1),
            max_retries: 3,
            retry_base: Duration::from_millis(500),
            retry_max: Duration::from_secs(10),
        }
    }
}

impl From<&RestSettings> for LimiterConfig {
    fn from(settings: &RestSettings) -> Self {
        Self {
            global_limit: settings.global_limit,
            max_retries: settings.max_retries,
            ..Self::default()
        }
    }
}

/// Gates outbound REST calls on route and global buckets
pub struct RestLimiter {
    transport: Arc<dyn HttpTransport>,
    buckets: DashMap<RouteKey, Arc<Mutex<RateBucket>>>,
    global: Mutex<RateBucket>,
    config: LimiterConfig,
}

impl RestLimiter {
    pub fn new(transport: Arc<dyn HttpTransport>, config: LimiterConfig) -> Self {
        Self {
            transport,
            buckets: DashMap::new(),
            global: Mutex::new(RateBucket::with_window(
                config.global_limit,
                config.global_window,
            )),
            config,
        }
    }

    /// Send `request` once both buckets have capacity
    ///
    /// A 429 is retried once after the server's retry-after without taking a
    /// second call from the buckets; a second 429 is returned as
    /// [`RestError::RateLimited`]. 5xx and network failures are retried up to
    /// `max_retries` times with backoff. Other 4xx are returned immediately.
    pub async fn execute(
        &self,
        route: &RouteKey,
        request: &RestRequest,
    ) -> Result<RestResponse, RestError> {
        let mut rate_limited = false;
        let mut holds_permit = false;
        let mut failures = 0u32;

        loop {
            if !holds_permit {
                self.acquire(route).await;
            }
            holds_permit = false;

            let response = match self.transport.send(request).await {
                Ok(response) => response,
                Err(e) if e.is_transient() && failures < self.config.max_retries => {
                    failures += 1;
                    let delay = self.retry_delay(failures);
                    warn!(route = %route, error = %e, attempt = failures, ?delay, "REST request failed, retrying");
                    sleep(delay).await;
                    continue;
                }
                Err(e) => return Err(e),
            };

            if response.headers.has_bucket_info() {
                self.update_bucket(route, &response.headers);
            }

            match response.status {
                429 => {
                    let (retry_after, global) = response.rate_limit();
                    let now = Instant::now();
                    if global {
                        self.global.lock().block_for(retry_after, now);
                    } else {
                        self.bucket(route).lock().block_for(retry_after, now);
                    }

                    if rate_limited {
                        warn!(route = %route, ?retry_after, global, "Rate limited again after retry");
                        return Err(RestError::RateLimited {
                            route: route.to_string(),
                            retry_after,
                            global,
                        });
                    }

                    warn!(
                        route = %route,
                        ?retry_after,
                        global,
                        bucket = response.headers.bucket.as_deref().unwrap_or("-"),
                        "Rate limited, retrying once"
                    );
                    rate_limited = true;
                    holds_permit = true;
                    sleep(retry_after).await;
                }
                status if status >= 500 => {
                    if failures >= self.config.max_retries {
                        return Err(RestError::Server {
                            status,
                            attempts: failures + 1,
                        });
                    }
                    failures += 1;
                    let delay = self.retry_delay(failures);
                    warn!(route = %route, status, attempt = failures, ?delay, "REST server error, retrying");
                    sleep(delay).await;
                }
                status if status >= 400 => {
                    return Err(RestError::Client {
                        status,
                        message: response.error_message(),
                    });
                }
                _ => return Ok(response),
            }
        }
    }

    /// Refresh a route bucket from server-reported headers
    pub fn update_bucket(&self, route: &RouteKey, headers: &RateLimitHeaders) {
        self.bucket(route).lock().update(headers, Instant::now());
    }

    /// Current state of a route bucket, if it has been used
    #[must_use]
    pub fn bucket_snapshot(&self, route: &RouteKey) -> Option<BucketSnapshot> {
        let bucket = self.buckets.get(route).map(|b| Arc::clone(b.value()))?;
        let snapshot = bucket.lock().snapshot(Instant::now());
        Some(snapshot)
    }

    /// Current state of the global bucket
    #[must_use]
    pub fn global_snapshot(&self) -> BucketSnapshot {
        self.global.lock().snapshot(Instant::now())
    }

    async fn acquire(&self, route: &RouteKey) {
        let bucket = self.bucket(route);
        wait_for_capacity(&bucket, route, "route").await;
        wait_for_capacity(&self.global, route, "global").await;
    }

    fn bucket(&self, route: &RouteKey) -> Arc<Mutex<RateBucket>> {
        let entry = self.buckets.entry(route.clone()).or_default();
        Arc::clone(entry.value())
    }

    fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.config
            .retry_base
            .saturating_mul(factor)
            .min(self.config.retry_max)
    }
}

async fn wait_for_capacity(bucket: &Mutex<RateBucket>, route: &RouteKey, kind: &str) {
    loop {
        let result = bucket.lock().try_acquire(Instant::now());
        match result {
            Ok(()) => return,
            Err(wait) => {
                debug!(route = %route, bucket = kind, ?wait, "Bucket exhausted, waiting");
                sleep(wait).await;
            }
        }
    }
}

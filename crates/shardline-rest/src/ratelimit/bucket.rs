//! Token bucket for one REST route (or the global budget)

use super::RateLimitHeaders;
use std::time::Duration;
use tokio::time::Instant;

/// Wait applied when a bucket reports zero capacity and no reset time
const UNKNOWN_RESET_WAIT: Duration = Duration::from_secs(1);

/// Remaining-call budget and reset time for one bucket
///
/// A route bucket starts out unknown and lets requests through until the
/// first response reports its limits. A windowed bucket (the global budget)
/// refills itself locally every `window`.
#[derive(Debug, Clone)]
pub struct RateBucket {
    limit: Option<u32>,
    remaining: u32,
    reset_at: Option<Instant>,
    window: Option<Duration>,
    blocked_until: Option<Instant>,
}

/// Point-in-time view of a bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketSnapshot {
    pub limit: Option<u32>,
    pub remaining: u32,
    pub reset_after: Option<Duration>,
    pub blocked_for: Option<Duration>,
}

impl RateBucket {
    /// Bucket whose limits are not known yet
    #[must_use]
    pub fn unknown() -> Self {
        Self {
            limit: None,
            remaining: 0,
            reset_at: None,
            window: None,
            blocked_until: None,
        }
    }

    /// Bucket that grants `limit` calls per `window`, refilled locally
    #[must_use]
    pub fn with_window(limit: u32, window: Duration) -> Self {
        Self {
            limit: Some(limit),
            remaining: limit,
            reset_at: None,
            window: Some(window),
            blocked_until: None,
        }
    }

    /// Take one call from the budget, or report how long to wait
    pub fn try_acquire(&mut self, now: Instant) -> Result<(), Duration> {
        if let Some(until) = self.blocked_until {
            if now < until {
                return Err(until - now);
            }
            self.blocked_until = None;
        }

        let Some(limit) = self.limit else {
            return Ok(());
        };

        match self.reset_at {
            Some(reset_at) if now >= reset_at => {
                self.remaining = limit;
                self.reset_at = None;
            }
            None if self.remaining == 0 => self.remaining = limit,
            _ => {}
        }

        if self.remaining == 0 {
            return Err(self
                .reset_at
                .map_or(UNKNOWN_RESET_WAIT, |reset_at| reset_at - now));
        }

        if self.reset_at.is_none() {
            self.reset_at = self.window.map(|window| now + window);
        }
        self.remaining -= 1;
        Ok(())
    }

    /// Overwrite local accounting with what the server reported
    pub fn update(&mut self, headers: &RateLimitHeaders, now: Instant) {
        if let Some(limit) = headers.limit {
            self.limit = Some(limit);
        }
        if let Some(remaining) = headers.remaining {
            self.remaining = match self.limit {
                Some(limit) => remaining.min(limit),
                None => remaining,
            };
            if self.limit.is_none() {
                self.limit = Some(remaining);
            }
        }
        if let Some(reset_after) = headers.reset_after {
            self.reset_at = Some(now + reset_after);
        }
    }

    /// Refuse all calls until `now + duration`
    pub fn block_for(&mut self, duration: Duration, now: Instant) {
        let until = now + duration;
        self.blocked_until = Some(self.blocked_until.map_or(until, |current| current.max(until)));
    }

    #[must_use]
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    #[must_use]
    pub fn limit(&self) -> Option<u32> {
        self.limit
    }

    #[must_use]
    pub fn snapshot(&self, now: Instant) -> BucketSnapshot {
        BucketSnapshot {
            limit: self.limit,
            remaining: self.remaining,
            reset_after: self.reset_at.map(|at| at.saturating_duration_since(now)),
            blocked_for: self
                .blocked_until
                .map(|at| at.saturating_duration_since(now))
                .filter(|d| !d.is_zero()),
        }
    }
}

impl Default for RateBucket {
    fn default() -> Self {
        Self::unknown()
    }
}

//! Heartbeat timer
//!
//! Started on Hello. The first beat fires after a random fraction of the
//! interval, then every interval. If the previous beat was never acked when
//! the next one is due, the connection is a zombie.

use std::time::Duration;
use tokio::time::Instant;

/// What to do when a beat is due
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Beat {
    Send,
    Zombie,
}

/// Heartbeat bookkeeping for one connection
#[derive(Debug, Clone)]
pub struct Heartbeater {
    interval: Duration,
    next_beat: Instant,
    awaiting_ack: bool,
    last_sent: Option<Instant>,
    last_ack: Option<Instant>,
    latency: Option<Duration>,
}

impl Heartbeater {
    /// `jitter` in `[0, 1)` scales the delay before the first beat
    #[must_use]
    pub fn new(interval: Duration, jitter: f64, now: Instant) -> Self {
        Self {
            interval,
            next_beat: now + interval.mul_f64(jitter.clamp(0.0, 1.0)),
            awaiting_ack: false,
            last_sent: None,
            last_ack: None,
            latency: None,
        }
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    #[must_use]
    pub fn next_beat(&self) -> Instant {
        self.next_beat
    }

    #[must_use]
    pub fn awaiting_ack(&self) -> bool {
        self.awaiting_ack
    }

    /// Round trip of the last acked heartbeat
    #[must_use]
    pub fn latency(&self) -> Option<Duration> {
        self.latency
    }

    #[must_use]
    pub fn last_ack(&self) -> Option<Instant> {
        self.last_ack
    }

    /// Scheduled beat is due
    pub fn beat(&mut self, now: Instant) -> Beat {
        if self.awaiting_ack {
            return Beat::Zombie;
        }
        self.record_sent(now);
        self.next_beat = now + self.interval;
        Beat::Send
    }

    /// Heartbeat sent because the server asked for one
    pub fn record_sent(&mut self, now: Instant) {
        self.awaiting_ack = true;
        self.last_sent = Some(now);
    }

    pub fn ack(&mut self, now: Instant) {
        self.awaiting_ack = false;
        self.last_ack = Some(now);
        self.latency = self.last_sent.map(|sent| now.saturating_duration_since(sent));
    }
}

//! In-memory session store
//!
//! Each shard is the only writer of its own entry. The map is shared so that
//! a shard rebuilt after a crash picks up where the previous one left off.

use dashmap::DashMap;
use shardline_core::ShardId;
use std::sync::Arc;
use tracing::{debug, trace};

/// Resume state for one shard
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub session_id: Option<String>,
    pub sequence: Option<u64>,
    pub resume_url: Option<String>,
}

impl Session {
    /// A session can be resumed once it has a non-empty id
    #[must_use]
    pub fn is_resumable(&self) -> bool {
        self.session_id.as_deref().is_some_and(|id| !id.is_empty())
    }
}

/// Session records keyed by shard
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    sessions: Arc<DashMap<ShardId, Session>>,
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current session for a shard (empty if none)
    #[must_use]
    pub fn get(&self, shard: ShardId) -> Session {
        self.sessions
            .get(&shard)
            .map(|s| s.value().clone())
            .unwrap_or_default()
    }

    /// Record a newly started session; the sequence starts over
    pub fn set_session(&self, shard: ShardId, session_id: String, resume_url: Option<String>) {
        debug!(shard = %shard, session_id = %session_id, "Session started");
        self.sessions.insert(
            shard,
            Session {
                session_id: Some(session_id),
                sequence: None,
                resume_url,
            },
        );
    }

    /// Advance the sequence; returns false (and changes nothing) unless
    /// `sequence` is greater than the current one
    pub fn update_sequence(&self, shard: ShardId, sequence: u64) -> bool {
        let mut entry = self.sessions.entry(shard).or_default();
        let latest = entry.sequence;
        match latest {
            Some(current) if sequence <= current => {
                trace!(shard = %shard, current, sequence, "Stale sequence ignored");
                false
            }
            _ => {
                entry.sequence = Some(sequence);
                true
            }
        }
    }

    /// Forget everything about a shard's session
    pub fn clear(&self, shard: ShardId) {
        if self.sessions.remove(&shard).is_some() {
            debug!(shard = %shard, "Session cleared");
        }
    }

    #[must_use]
    pub fn is_resumable(&self, shard: ShardId) -> bool {
        self.sessions
            .get(&shard)
            .is_some_and(|s| s.value().is_resumable())
    }

    /// Last sequence seen by a shard
    #[must_use]
    pub fn sequence(&self, shard: ShardId) -> Option<u64> {
        self.sessions.get(&shard).and_then(|s| s.value().sequence)
    }

    /// All sessions, ordered by shard
    #[must_use]
    pub fn snapshot(&self) -> Vec<(ShardId, Session)> {
        let mut sessions: Vec<_> = self
            .sessions
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        sessions.sort_by_key(|(shard, _)| *shard);
        sessions
    }
}

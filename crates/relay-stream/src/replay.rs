//! Bounded replay buffer: the most recent events of an active job,
//! retained by count and by age.
//!
//! The buffer always holds a contiguous suffix of the job's events, so the
//! oldest retained sequence number is enough to decide whether a resume
//! point is still serviceable.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::envelope::StreamEnvelope;

/// Count+age-bounded ring of recently published events.
pub struct ReplayBuffer {
    max_events: usize,
    max_age: Duration,
    entries: VecDeque<(Instant, Arc<StreamEnvelope>)>,
}

impl ReplayBuffer {
    /// Create a buffer with the given bounds.
    #[must_use]
    pub fn new(max_events: usize, max_age: Duration) -> Self {
        Self {
            max_events,
            max_age,
            entries: VecDeque::with_capacity(max_events.min(64)),
        }
    }

    /// Append an event, evicting by count and age.
    pub fn push(&mut self, envelope: Arc<StreamEnvelope>) {
        let now = Instant::now();
        self.entries.push_back((now, envelope));
        while self.entries.len() > self.max_events {
            let _ = self.entries.pop_front();
        }
        self.evict_aged(now);
    }

    /// Drop entries older than the age bound.
    pub fn evict_aged(&mut self, now: Instant) {
        while let Some((inserted, _)) = self.entries.front() {
            if now.duration_since(*inserted) <= self.max_age {
                break;
            }
            let _ = self.entries.pop_front();
        }
    }

    /// Oldest retained sequence number, if any events are retained.
    #[must_use]
    pub fn oldest_seq(&self) -> Option<u64> {
        self.entries.front().map(|(_, env)| env.seq)
    }

    /// Newest retained sequence number, if any events are retained.
    #[must_use]
    pub fn newest_seq(&self) -> Option<u64> {
        self.entries.back().map(|(_, env)| env.seq)
    }

    /// All retained events with sequence greater than `after_seq`, in
    /// order.
    #[must_use]
    pub fn events_after(&self, after_seq: u64) -> Vec<Arc<StreamEnvelope>> {
        self.entries
            .iter()
            .filter(|(_, env)| env.seq > after_seq)
            .map(|(_, env)| Arc::clone(env))
            .collect()
    }

    /// Number of retained events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

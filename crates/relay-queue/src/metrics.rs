//! Point-in-time queue metrics snapshot.

use serde::{Deserialize, Serialize};

/// Counts of jobs by state, recomputed on demand. Not persisted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueMetrics {
    /// Enqueued, not yet picked up by a worker.
    pub waiting: u64,
    /// Currently executing.
    pub active: u64,
    /// Finished successfully.
    pub completed: u64,
    /// Finished with an error.
    pub failed: u64,
    /// Scheduled for a future promotion to waiting.
    pub delayed: u64,
    /// Held back because the queue is paused.
    pub paused: u64,
    /// Sum of all buckets.
    pub total: u64,
}

impl QueueMetrics {
    /// Recompute `total` from the individual buckets.
    #[must_use]
    pub fn with_total(mut self) -> Self {
        self.total =
            self.waiting + self.active + self.completed + self.failed + self.delayed + self.paused;
        self
    }
}

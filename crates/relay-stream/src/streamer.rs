//! Event streamer — sequenced fan-out with bounded replay.
//!
//! One stream per active job. `publish` assigns the next sequence number,
//! appends to the replay buffer, and broadcasts to every subscriber under
//! one lock, so delivery order equals sequence order for every subscriber
//! and replay can be stitched to live delivery without gaps or duplicates.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use metrics::counter;
use parking_lot::Mutex;
use relay_core::events::JobEvent;
use relay_core::ids::{JobId, SessionId};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::connection::{Subscriber, Subscription};
use crate::envelope::StreamEnvelope;
use crate::errors::StreamError;
use crate::replay::ReplayBuffer;

/// Streamer configuration.
#[derive(Clone, Debug)]
pub struct StreamConfig {
    /// Maximum events retained per job for replay.
    pub replay_max_events: usize,
    /// Maximum age of a retained event.
    pub replay_max_age: Duration,
    /// Per-subscriber channel capacity beyond the replay window.
    pub subscriber_buffer: usize,
    /// Total drops before a slow subscriber is evicted.
    pub max_subscriber_drops: u64,
    /// Grace period after the terminal event before the stream closes,
    /// allowing final acknowledgment.
    pub terminal_grace: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            replay_max_events: 256,
            replay_max_age: Duration::from_secs(60),
            subscriber_buffer: 64,
            max_subscriber_drops: 100,
            terminal_grace: Duration::from_secs(2),
        }
    }
}

struct JobStreamInner {
    /// Next sequence number to assign (1-based).
    next_seq: u64,
    buffer: ReplayBuffer,
    subscribers: Vec<Arc<Subscriber>>,
    finished: bool,
}

struct JobStream {
    session_id: SessionId,
    inner: Mutex<JobStreamInner>,
}

/// Multiplexes job-progress events to all subscribed clients, with
/// bounded replay for reconnects.
pub struct EventStreamer {
    jobs: Arc<DashMap<String, Arc<JobStream>>>,
    config: StreamConfig,
    subscriber_counter: AtomicU64,
}

impl EventStreamer {
    /// Create a streamer.
    #[must_use]
    pub fn new(config: StreamConfig) -> Self {
        Self {
            jobs: Arc::new(DashMap::new()),
            config,
            subscriber_counter: AtomicU64::new(0),
        }
    }

    /// Open a stream for an admitted job. Idempotent.
    pub fn open_job(&self, job_id: &JobId, session_id: &SessionId) {
        let _ = self
            .jobs
            .entry(job_id.as_str().to_owned())
            .or_insert_with(|| {
                Arc::new(JobStream {
                    session_id: session_id.clone(),
                    inner: Mutex::new(JobStreamInner {
                        next_seq: 1,
                        buffer: ReplayBuffer::new(
                            self.config.replay_max_events,
                            self.config.replay_max_age,
                        ),
                        subscribers: Vec::new(),
                        finished: false,
                    }),
                })
            });
        debug!(job_id = %job_id, session_id = %session_id, "job stream opened");
    }

    /// Publish one event: assign its sequence number, retain it, and
    /// broadcast to every subscriber. Returns the assigned sequence.
    pub fn publish(&self, job_id: &JobId, event: JobEvent) -> Result<u64, StreamError> {
        let stream = self.stream(job_id)?;
        let mut inner = stream.inner.lock();

        let seq = inner.next_seq;
        inner.next_seq += 1;
        let envelope = Arc::new(StreamEnvelope {
            seq,
            job_id: job_id.clone(),
            session_id: stream.session_id.clone(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            event,
        });
        inner.buffer.push(Arc::clone(&envelope));

        let max_drops = self.config.max_subscriber_drops;
        inner.subscribers.retain(|subscriber| {
            if subscriber.send(Arc::clone(&envelope)) {
                return true;
            }
            counter!("relay_stream_envelope_drops_total").increment(1);
            let drops = subscriber.drop_count();
            if drops >= max_drops {
                warn!(
                    subscriber = %subscriber.id,
                    job_id = %job_id,
                    drops,
                    "evicting slow subscriber"
                );
                false
            } else {
                true
            }
        });

        debug!(
            job_id = %job_id,
            seq,
            event_type = envelope.event.event_type(),
            recipients = inner.subscribers.len(),
            "event published"
        );
        Ok(seq)
    }

    /// Subscribe to a job's stream.
    ///
    /// With `after_seq`, retained events with sequence greater than it are
    /// replayed first; registration happens under the same lock, so the
    /// live tail continues the replay with no gap and no duplicate.
    /// [`StreamError::ReplayWindowExpired`] when the resume point predates
    /// retention — the client must poll the session's persisted state.
    pub fn subscribe(
        &self,
        job_id: &JobId,
        after_seq: Option<u64>,
    ) -> Result<Subscription, StreamError> {
        let stream = self.stream(job_id)?;
        let mut inner = stream.inner.lock();
        inner.buffer.evict_aged(Instant::now());

        let capacity = (self.config.subscriber_buffer + self.config.replay_max_events).max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let id = format!(
            "sub_{}",
            self.subscriber_counter.fetch_add(1, Ordering::Relaxed)
        );
        let subscriber = Arc::new(Subscriber::new(id.clone(), tx));

        if let Some(after) = after_seq {
            // The buffer holds a contiguous suffix, so the oldest retained
            // sequence is derivable from the publish counter.
            let oldest_retained = inner.next_seq - inner.buffer.len() as u64;
            if after + 1 < oldest_retained {
                return Err(StreamError::ReplayWindowExpired {
                    job_id: job_id.as_str().to_owned(),
                    oldest_retained,
                });
            }
            for envelope in inner.buffer.events_after(after) {
                // Capacity covers the whole retained window.
                let _ = subscriber.send(envelope);
            }
        }

        inner.subscribers.push(subscriber);
        debug!(job_id = %job_id, subscriber = %id, ?after_seq, "subscribed");
        Ok(Subscription::new(id, job_id.clone(), rx))
    }

    /// Mark a job's stream finished and close it after the grace period.
    ///
    /// The terminal event must already have been published; subscribers
    /// get the grace window to acknowledge it before their channels close
    /// and the replay buffer is discarded.
    pub fn finish_job(&self, job_id: &JobId) {
        let Ok(stream) = self.stream(job_id) else {
            return;
        };
        {
            let mut inner = stream.inner.lock();
            inner.finished = true;
        }

        let grace = self.config.terminal_grace;
        if grace.is_zero() {
            let _ = self.jobs.remove(job_id.as_str());
            return;
        }
        let jobs = Arc::clone(&self.jobs);
        let key = job_id.as_str().to_owned();
        drop(tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let _ = jobs.remove(&key);
            debug!(job_id = %key, "job stream closed");
        }));
    }

    /// Drop a job's stream immediately (admission rollback).
    pub fn discard_job(&self, job_id: &JobId) {
        let _ = self.jobs.remove(job_id.as_str());
    }

    /// Whether a job's stream is open.
    #[must_use]
    pub fn is_open(&self, job_id: &JobId) -> bool {
        self.jobs.contains_key(job_id.as_str())
    }

    /// Whether a job's stream has seen its terminal event.
    #[must_use]
    pub fn is_finished(&self, job_id: &JobId) -> bool {
        self.stream(job_id)
            .map(|stream| stream.inner.lock().finished)
            .unwrap_or(false)
    }

    /// Current subscriber count for a job.
    #[must_use]
    pub fn subscriber_count(&self, job_id: &JobId) -> usize {
        self.stream(job_id)
            .map(|stream| stream.inner.lock().subscribers.len())
            .unwrap_or(0)
    }

    fn stream(&self, job_id: &JobId) -> Result<Arc<JobStream>, StreamError> {
        self.jobs
            .get(job_id.as_str())
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| StreamError::UnknownJob(job_id.as_str().to_owned()))
    }
}

impl Default for EventStreamer {
    fn default() -> Self {
        Self::new(StreamConfig::default())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

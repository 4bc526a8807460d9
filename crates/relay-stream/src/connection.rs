//! Subscriber connection state.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use relay_core::ids::JobId;
use tokio::sync::mpsc;

use crate::envelope::StreamEnvelope;

/// Sender half of one subscription, held by the streamer.
pub(crate) struct Subscriber {
    /// Unique subscriber ID.
    pub id: String,
    tx: mpsc::Sender<Arc<StreamEnvelope>>,
    dropped: AtomicU64,
}

impl Subscriber {
    pub(crate) fn new(id: String, tx: mpsc::Sender<Arc<StreamEnvelope>>) -> Self {
        Self {
            id,
            tx,
            dropped: AtomicU64::new(0),
        }
    }

    /// Send an envelope without blocking.
    ///
    /// Returns `false` if the channel is full or closed, and increments
    /// the dropped counter.
    pub(crate) fn send(&self, envelope: Arc<StreamEnvelope>) -> bool {
        if self.tx.try_send(envelope).is_ok() {
            true
        } else {
            let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Total envelopes dropped for this subscriber.
    pub(crate) fn drop_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Receiver half of one subscription, handed to the client connection.
///
/// The channel closes when the job's stream is discarded (after the
/// terminal grace period) or when the subscriber was evicted for falling
/// too far behind.
#[derive(Debug)]
pub struct Subscription {
    /// Unique subscriber ID.
    pub id: String,
    /// The job this subscription observes.
    pub job_id: JobId,
    receiver: mpsc::Receiver<Arc<StreamEnvelope>>,
}

impl Subscription {
    pub(crate) fn new(
        id: String,
        job_id: JobId,
        receiver: mpsc::Receiver<Arc<StreamEnvelope>>,
    ) -> Self {
        Self {
            id,
            job_id,
            receiver,
        }
    }

    /// Await the next envelope. `None` when the stream is closed.
    pub async fn next(&mut self) -> Option<Arc<StreamEnvelope>> {
        self.receiver.recv().await
    }

    /// Non-blocking poll for the next envelope.
    pub fn try_next(&mut self) -> Option<Arc<StreamEnvelope>> {
        self.receiver.try_recv().ok()
    }
}

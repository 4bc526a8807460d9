//! In-process queue implementation: a tokio worker pool over a shared
//! channel.
//!
//! Workers pull jobs one at a time, invoke the [`JobRunner`], forward every
//! event to the [`JobEventSink`], enforce the exactly-one-terminal-event
//! contract, and report `(job, outcome)` on the terminal channel. Pause
//! gates workers between jobs; cancellation is cooperative via per-job
//! tokens.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use metrics::counter;
use relay_core::events::{JobEvent, JobFailure};
use relay_core::ids::JobId;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::QueueError;
use crate::job::{Job, JobOutcome};
use crate::metrics::QueueMetrics;
use crate::queue::{JobQueue, TerminalEvent};
use crate::runner::{JobEventSink, JobRunner, codes};

/// Worker pool configuration.
#[derive(Clone, Debug)]
pub struct QueueConfig {
    /// Number of worker tasks.
    pub workers: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { workers: 4 }
    }
}

/// Per-state atomic counters backing [`QueueMetrics`].
#[derive(Default)]
struct Counters {
    waiting: AtomicU64,
    active: AtomicU64,
    delayed: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

/// In-process job queue with a tokio worker pool.
pub struct InProcessQueue {
    me: std::sync::Weak<Self>,
    runner: Arc<dyn JobRunner>,
    sink: Arc<dyn JobEventSink>,
    config: QueueConfig,
    job_tx: mpsc::UnboundedSender<Job>,
    job_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Job>>,
    cancel_tokens: DashMap<String, CancellationToken>,
    counters: Counters,
    paused: AtomicBool,
    resume_notify: Notify,
    shutdown: CancellationToken,
    terminal_tx: mpsc::UnboundedSender<TerminalEvent>,
    workers: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl InProcessQueue {
    /// Create a queue. The returned receiver yields one [`TerminalEvent`]
    /// per finished job; the orchestration layer consumes it. Call
    /// [`start`](Self::start) to spawn the workers.
    pub fn new(
        runner: Arc<dyn JobRunner>,
        sink: Arc<dyn JobEventSink>,
        config: QueueConfig,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<TerminalEvent>) {
        let (job_tx, job_rx) = mpsc::unbounded_channel();
        let (terminal_tx, terminal_rx) = mpsc::unbounded_channel();
        let queue = Arc::new_cyclic(|me| Self {
            me: me.clone(),
            runner,
            sink,
            config,
            job_tx,
            job_rx: tokio::sync::Mutex::new(job_rx),
            cancel_tokens: DashMap::new(),
            counters: Counters::default(),
            paused: AtomicBool::new(false),
            resume_notify: Notify::new(),
            shutdown: CancellationToken::new(),
            terminal_tx,
            workers: parking_lot::Mutex::new(Vec::new()),
        });
        (queue, terminal_rx)
    }

    /// Spawn the worker tasks.
    pub fn start(self: &Arc<Self>) {
        let mut workers = self.workers.lock();
        if !workers.is_empty() {
            return;
        }
        for worker_id in 0..self.config.workers.max(1) {
            let queue = Arc::clone(self);
            workers.push(tokio::spawn(async move {
                queue.worker_loop(worker_id).await;
            }));
        }
        info!(workers = self.config.workers.max(1), "queue workers started");
    }

    /// Drain: stop accepting work, wait for workers to exit.
    ///
    /// Jobs still waiting in the channel are dropped; an in-flight job
    /// is lost on worker death by design and must be resubmitted.
    pub async fn drain(&self) {
        self.shutdown.cancel();
        self.resume_notify.notify_waiters();
        let handles: Vec<JoinHandle<()>> = { self.workers.lock().drain(..).collect() };
        for handle in handles {
            let _ = handle.await;
        }
        info!("queue workers drained");
    }

    async fn worker_loop(self: Arc<Self>, worker_id: usize) {
        loop {
            let job = {
                let mut rx = self.job_rx.lock().await;
                tokio::select! {
                    () = self.shutdown.cancelled() => return,
                    job = rx.recv() => match job {
                        Some(job) => job,
                        None => return,
                    },
                }
            };

            // Pause gate: a pulled job is held, never started, while the
            // queue is paused. Jobs already mid-run are unaffected.
            while self.paused.load(Ordering::Acquire) {
                tokio::select! {
                    () = self.shutdown.cancelled() => return,
                    () = self.resume_notify.notified() => {}
                }
            }

            let _ = self.counters.waiting.fetch_sub(1, Ordering::Relaxed);
            let _ = self.counters.active.fetch_add(1, Ordering::Relaxed);
            debug!(worker = worker_id, job_id = %job.id, "job picked up");
            self.process(job).await;
            let _ = self.counters.active.fetch_sub(1, Ordering::Relaxed);
        }
    }

    /// Run one job to its terminal outcome and report it.
    async fn process(&self, job: Job) {
        let cancel = self
            .cancel_tokens
            .get(job.id.as_str())
            .map(|entry| entry.value().clone())
            .unwrap_or_default();

        let started = Instant::now();
        let outcome = self.execute(&job, cancel).await;
        self.sink.finish(&job.id);
        let _ = self.cancel_tokens.remove(job.id.as_str());

        match &outcome {
            JobOutcome::Completed(_) => {
                let _ = self.counters.completed.fetch_add(1, Ordering::Relaxed);
                counter!("relay_queue_jobs_completed_total").increment(1);
            }
            JobOutcome::Failed(_) => {
                let _ = self.counters.failed.fetch_add(1, Ordering::Relaxed);
                counter!("relay_queue_jobs_failed_total").increment(1);
            }
        }
        info!(
            job_id = %job.id,
            session_id = %job.session_id,
            completed = outcome.is_completed(),
            duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "job finished"
        );

        let _ = self.terminal_tx.send(TerminalEvent {
            job_id: job.id,
            session_id: job.session_id,
            outcome,
        });
    }

    /// Drive the runner's stream, publishing every event, and return the
    /// terminal outcome. Synthesizes a failure when the runner breaks its
    /// contract.
    async fn execute(&self, job: &Job, cancel: CancellationToken) -> JobOutcome {
        if cancel.is_cancelled() {
            return self.fail(&job.id, "job cancelled before start", codes::CANCELLED);
        }

        let mut stream = match self.runner.run(job, cancel).await {
            Ok(stream) => stream,
            Err(e) => {
                let code = e.code.clone();
                return self.fail(
                    &job.id,
                    e.message,
                    code.as_deref().unwrap_or(codes::RUNNER_START),
                );
            }
        };

        while let Some(event) = stream.next().await {
            match event {
                JobEvent::Complete(completion) => {
                    self.sink
                        .publish(&job.id, JobEvent::Complete(completion.clone()));
                    return JobOutcome::Completed(completion);
                }
                JobEvent::Error(failure) => {
                    self.sink.publish(&job.id, JobEvent::Error(failure.clone()));
                    return JobOutcome::Failed(failure);
                }
                other => self.sink.publish(&job.id, other),
            }
        }

        warn!(job_id = %job.id, "runner stream ended without a terminal event");
        self.fail(
            &job.id,
            "runner stream ended without a terminal event",
            codes::RUNNER_PROTOCOL,
        )
    }

    /// Publish a synthesized terminal error and build the failed outcome.
    fn fail(&self, job_id: &JobId, message: impl Into<String>, code: &str) -> JobOutcome {
        let failure = JobFailure::new(message, Some(code));
        self.sink.publish(job_id, JobEvent::Error(failure.clone()));
        JobOutcome::Failed(failure)
    }
}

#[async_trait]
impl JobQueue for InProcessQueue {
    async fn enqueue(&self, job: Job) -> Result<JobId, QueueError> {
        if self.shutdown.is_cancelled() {
            return Err(QueueError::ShuttingDown);
        }
        let job_id = job.id.clone();
        let _ = self
            .cancel_tokens
            .insert(job_id.as_str().to_owned(), CancellationToken::new());
        let _ = self.counters.waiting.fetch_add(1, Ordering::Relaxed);

        if self.job_tx.send(job).is_err() {
            let _ = self.counters.waiting.fetch_sub(1, Ordering::Relaxed);
            let _ = self.cancel_tokens.remove(job_id.as_str());
            return Err(QueueError::EnqueueFailed("job channel closed".into()));
        }
        debug!(job_id = %job_id, "job enqueued");
        Ok(job_id)
    }

    async fn enqueue_delayed(&self, job: Job, delay: Duration) -> Result<JobId, QueueError> {
        if self.shutdown.is_cancelled() {
            return Err(QueueError::ShuttingDown);
        }
        let Some(queue) = self.me.upgrade() else {
            return Err(QueueError::EnqueueFailed("queue dropped".into()));
        };

        let job_id = job.id.clone();
        let _ = self
            .cancel_tokens
            .insert(job_id.as_str().to_owned(), CancellationToken::new());
        let _ = self.counters.delayed.fetch_add(1, Ordering::Relaxed);
        debug!(job_id = %job_id, delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX), "job delayed");

        drop(tokio::spawn(async move {
            tokio::select! {
                () = queue.shutdown.cancelled() => {
                    let _ = queue.counters.delayed.fetch_sub(1, Ordering::Relaxed);
                }
                () = tokio::time::sleep(delay) => {
                    let _ = queue.counters.delayed.fetch_sub(1, Ordering::Relaxed);
                    queue.promote(job);
                }
            }
        }));
        Ok(job_id)
    }

    fn cancel(&self, job_id: &JobId) -> bool {
        if let Some(entry) = self.cancel_tokens.get(job_id.as_str()) {
            entry.value().cancel();
            debug!(job_id = %job_id, "cancellation requested");
            true
        } else {
            false
        }
    }

    fn pause(&self) {
        self.paused.store(true, Ordering::Release);
        info!("queue paused");
    }

    fn resume(&self) {
        self.paused.store(false, Ordering::Release);
        self.resume_notify.notify_waiters();
        info!("queue resumed");
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    fn metrics(&self) -> QueueMetrics {
        let waiting = self.counters.waiting.load(Ordering::Relaxed);
        let (waiting, paused) = if self.is_paused() {
            (0, waiting)
        } else {
            (waiting, 0)
        };
        QueueMetrics {
            waiting,
            active: self.counters.active.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            delayed: self.counters.delayed.load(Ordering::Relaxed),
            paused,
            total: 0,
        }
        .with_total()
    }
}

impl InProcessQueue {
    /// Move a delayed job into the waiting channel (or fail it if it was
    /// cancelled while delayed).
    fn promote(&self, job: Job) {
        let cancelled = self
            .cancel_tokens
            .get(job.id.as_str())
            .is_some_and(|entry| entry.value().is_cancelled());
        if cancelled {
            let outcome = self.fail(&job.id, "job cancelled while delayed", codes::CANCELLED);
            self.sink.finish(&job.id);
            let _ = self.cancel_tokens.remove(job.id.as_str());
            let _ = self.counters.failed.fetch_add(1, Ordering::Relaxed);
            counter!("relay_queue_jobs_failed_total").increment(1);
            let _ = self.terminal_tx.send(TerminalEvent {
                job_id: job.id,
                session_id: job.session_id,
                outcome,
            });
            return;
        }

        let _ = self.counters.waiting.fetch_add(1, Ordering::Relaxed);
        if self.job_tx.send(job).is_err() {
            let _ = self.counters.waiting.fetch_sub(1, Ordering::Relaxed);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

//! Session job orchestrator — the admission state machine.
//!
//! Each session cycles `idle ↔ working`. Admission is an atomic
//! check-and-set against the session store: of two racing submissions,
//! exactly one wins; the loser sees `SessionBusy`. Every enqueue is paired
//! with a compensating rollback, so a session can never be left `working`
//! with no runnable job. Terminal reconciliation is idempotent — a stale
//! terminal event (from a since-superseded attempt) is a logged no-op.

use std::sync::Arc;

use dashmap::DashMap;
use relay_core::ids::{JobId, MessageId, PromptId, SessionId};
use relay_core::provider::Provider;
use relay_queue::job::{Job, JobOutcome};
use relay_queue::queue::JobQueue;
use relay_store::row_types::{JobStatus, MessageRole};
use relay_store::store::{NewMessage, SessionStore};
use relay_stream::EventStreamer;
use tracing::{debug, info, instrument, warn};

use crate::errors::RuntimeError;

/// Options accompanying a prompt submission.
#[derive(Clone, Debug, Default)]
pub struct SubmitOptions {
    /// Tools the runner may use, when restricted.
    pub allowed_tools: Option<Vec<String>>,
    /// Model override.
    pub model: Option<String>,
    /// Prompt identifier; generated when absent.
    pub prompt_id: Option<PromptId>,
}

/// Handle returned to the caller once a job is admitted and enqueued.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobHandle {
    /// The admitted job.
    pub job_id: JobId,
    /// The session it runs in.
    pub session_id: SessionId,
}

/// Orchestrator-side record of a job between admission and terminal.
struct InFlightJob {
    session_id: String,
    cancel_requested: bool,
}

/// The per-session admission state machine.
pub struct Orchestrator {
    store: Arc<dyn SessionStore>,
    queue: Arc<dyn JobQueue>,
    streamer: Arc<EventStreamer>,
    in_flight: DashMap<String, InFlightJob>,
}

impl Orchestrator {
    /// Create an orchestrator over its collaborators.
    pub fn new(
        store: Arc<dyn SessionStore>,
        queue: Arc<dyn JobQueue>,
        streamer: Arc<EventStreamer>,
    ) -> Self {
        Self {
            store,
            queue,
            streamer,
            in_flight: DashMap::new(),
        }
    }

    /// Submit a prompt to a session.
    ///
    /// Fails with [`RuntimeError::SessionBusy`] when the session already
    /// has an active job — admission is exclusive, not queued, because a
    /// session is one conversational focus at a time. On success the user
    /// turn is recorded, the session transitions to `working`, an event
    /// channel is opened, and the job is enqueued. Returns as soon as the
    /// job is admitted; it does not wait for completion.
    #[instrument(skip(self, prompt, options))]
    pub async fn submit(
        &self,
        session_id: &str,
        prompt: &str,
        options: SubmitOptions,
    ) -> Result<JobHandle, RuntimeError> {
        let session = self
            .store
            .get_session(session_id)?
            .ok_or_else(|| RuntimeError::SessionNotFound(session_id.to_owned()))?;
        let provider: Provider = session
            .provider
            .parse()
            .map_err(|e| RuntimeError::Internal(format!("corrupt session row: {e}")))?;

        let job_id = JobId::new();
        if !self.store.begin_job(session_id, job_id.as_str())? {
            debug!(session_id, "admission rejected, session working");
            return Err(RuntimeError::SessionBusy(session_id.to_owned()));
        }

        let message = match self.store.append_message(&NewMessage {
            session_id,
            role: MessageRole::User,
            content: prompt,
            provider_session_id: None,
        }) {
            Ok(message) => message,
            Err(e) => {
                let _ = self.store.rollback_job(session_id, job_id.as_str());
                return Err(e.into());
            }
        };

        let typed_session_id = SessionId::from(session_id);
        self.streamer.open_job(&job_id, &typed_session_id);
        let _ = self.in_flight.insert(
            job_id.as_str().to_owned(),
            InFlightJob {
                session_id: session_id.to_owned(),
                cancel_requested: false,
            },
        );

        let job = Job {
            id: job_id.clone(),
            provider,
            session_id: typed_session_id.clone(),
            prompt_id: options.prompt_id.unwrap_or_default(),
            prompt: prompt.to_owned(),
            allowed_tools: options.allowed_tools,
            project_path: session.project_path,
            message_id: Some(MessageId::from(message.id)),
            model: options.model,
        };

        if let Err(e) = self.queue.enqueue(job).await {
            // Compensating rollback: the session must not stay working
            // with no runnable job.
            let _ = self.store.rollback_job(session_id, job_id.as_str());
            self.streamer.discard_job(&job_id);
            let _ = self.in_flight.remove(job_id.as_str());
            warn!(session_id, job_id = %job_id, error = %e, "enqueue failed, admission rolled back");
            return Err(RuntimeError::EnqueueFailed(e.to_string()));
        }

        info!(session_id, job_id = %job_id, "job admitted");
        Ok(JobHandle {
            job_id,
            session_id: typed_session_id,
        })
    }

    /// Reconcile a terminal outcome into session state.
    ///
    /// Idempotent: unknown or stale job IDs are ignored. On the first
    /// applicable terminal event the assistant turn is appended,
    /// `last_job_status` is set (`cancelled` when cancellation was
    /// requested), the session returns to `idle`, and the job's tokens are
    /// added to the running counter.
    #[instrument(skip(self, outcome))]
    pub fn on_job_terminal(&self, job_id: &str, outcome: &JobOutcome) -> Result<(), RuntimeError> {
        let Some((_, in_flight)) = self.in_flight.remove(job_id) else {
            debug!(job_id, "stale terminal event ignored");
            return Ok(());
        };
        let session_id = in_flight.session_id;

        let (status, content, token_delta, provider_session_id) = match outcome {
            JobOutcome::Completed(completion) => (
                if in_flight.cancel_requested {
                    JobStatus::Cancelled
                } else {
                    JobStatus::Completed
                },
                completion.summary.clone().unwrap_or_default(),
                completion
                    .token_count
                    .map_or(0, |t| i64::try_from(t).unwrap_or(i64::MAX)),
                completion.provider_session_id.clone(),
            ),
            JobOutcome::Failed(failure) => (
                if in_flight.cancel_requested {
                    JobStatus::Cancelled
                } else {
                    JobStatus::Failed
                },
                failure.error.clone(),
                0,
                None,
            ),
        };

        let applied = self
            .store
            .finish_job(&session_id, job_id, status, token_delta)?;
        if !applied {
            debug!(job_id, session_id, "terminal for superseded job ignored");
            return Ok(());
        }

        let _ = self.store.append_message(&NewMessage {
            session_id: &session_id,
            role: MessageRole::Assistant,
            content: &content,
            provider_session_id: provider_session_id.as_deref(),
        })?;

        info!(job_id, session_id, status = status.as_str(), "job reconciled");
        Ok(())
    }

    /// Request cooperative cancellation of the session's current job.
    ///
    /// Marks intent (so the terminal event records `cancelled`) and
    /// cancels the job's token via the queue. Returns `false` when the
    /// session is idle. The runner is never force-killed.
    #[instrument(skip(self))]
    pub fn cancel(&self, session_id: &str) -> Result<bool, RuntimeError> {
        let session = self
            .store
            .get_session(session_id)?
            .ok_or_else(|| RuntimeError::SessionNotFound(session_id.to_owned()))?;
        let Some(job_id) = session.current_job_id else {
            return Ok(false);
        };

        if let Some(mut entry) = self.in_flight.get_mut(&job_id) {
            entry.cancel_requested = true;
        }
        if !self.queue.cancel(&JobId::from(job_id.clone())) {
            debug!(session_id, job_id, "cancel requested for job unknown to queue");
        }
        info!(session_id, job_id, "cancellation requested");
        Ok(true)
    }

    /// Number of jobs between admission and terminal.
    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use relay_core::events::{Completion, JobFailure};
    use relay_queue::errors::QueueError;
    use relay_queue::metrics::QueueMetrics;
    use relay_store::store::{ListMessagesOptions, NewSession, SqliteSessionStore};
    use relay_stream::{StreamConfig, EventStreamer};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    /// Queue double that records enqueued jobs instead of running them.
    #[derive(Default)]
    struct RecordingQueue {
        jobs: parking_lot::Mutex<Vec<Job>>,
        cancelled: parking_lot::Mutex<Vec<String>>,
        fail_next: AtomicBool,
    }

    #[async_trait]
    impl JobQueue for RecordingQueue {
        async fn enqueue(&self, job: Job) -> Result<JobId, QueueError> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(QueueError::EnqueueFailed("broker unavailable".into()));
            }
            let id = job.id.clone();
            self.jobs.lock().push(job);
            Ok(id)
        }

        async fn enqueue_delayed(&self, job: Job, _delay: Duration) -> Result<JobId, QueueError> {
            self.enqueue(job).await
        }

        fn cancel(&self, job_id: &JobId) -> bool {
            self.cancelled.lock().push(job_id.as_str().to_owned());
            true
        }

        fn pause(&self) {}
        fn resume(&self) {}
        fn is_paused(&self) -> bool {
            false
        }
        fn metrics(&self) -> QueueMetrics {
            QueueMetrics::default()
        }
    }

    struct Fixture {
        store: Arc<dyn SessionStore>,
        queue: Arc<RecordingQueue>,
        streamer: Arc<EventStreamer>,
        orchestrator: Orchestrator,
        session_id: String,
    }

    fn make_fixture() -> Fixture {
        let store: Arc<dyn SessionStore> =
            Arc::new(SqliteSessionStore::open_in_memory().unwrap());
        let queue = Arc::new(RecordingQueue::default());
        let streamer = Arc::new(EventStreamer::new(StreamConfig {
            terminal_grace: Duration::ZERO,
            ..StreamConfig::default()
        }));
        let session_id = store
            .create_session(&NewSession {
                provider: relay_core::provider::Provider::ClaudeCode,
                project_path: "/work/app",
                context: None,
                provider_home: None,
                metadata: None,
            })
            .unwrap()
            .id;
        let orchestrator = Orchestrator::new(
            Arc::clone(&store),
            Arc::clone(&queue) as Arc<dyn JobQueue>,
            Arc::clone(&streamer),
        );
        Fixture {
            store,
            queue,
            streamer,
            orchestrator,
            session_id,
        }
    }

    fn completed_outcome(tokens: u64) -> JobOutcome {
        JobOutcome::Completed(Completion {
            duration_ms: 10,
            token_count: Some(tokens),
            tool_call_count: 1,
            stop_reason: Some("end_turn".into()),
            provider_session_id: Some("thread_9".into()),
            summary: Some("all done".into()),
        })
    }

    #[tokio::test]
    async fn submit_admits_and_transitions_to_working() {
        let f = make_fixture();
        let handle = f
            .orchestrator
            .submit(&f.session_id, "fix the bug", SubmitOptions::default())
            .await
            .unwrap();

        let row = f.store.get_session(&f.session_id).unwrap().unwrap();
        assert!(row.is_working);
        assert_eq!(row.current_job_id.as_deref(), Some(handle.job_id.as_str()));

        // User turn recorded.
        let messages = f
            .store
            .list_messages(&f.session_id, &ListMessagesOptions::default())
            .unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[0].content, "fix the bug");

        // Job enqueued with the admitted ID, stream opened.
        let jobs = f.queue.jobs.lock();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, handle.job_id);
        assert_eq!(jobs[0].message_id.as_ref().map(|m| m.as_str()), Some(messages[0].id.as_str()));
        assert!(f.streamer.is_open(&handle.job_id));
    }

    #[tokio::test]
    async fn second_submit_is_busy() {
        let f = make_fixture();
        let handle = f
            .orchestrator
            .submit(&f.session_id, "p1", SubmitOptions::default())
            .await
            .unwrap();

        let err = f
            .orchestrator
            .submit(&f.session_id, "p2", SubmitOptions::default())
            .await
            .unwrap_err();
        assert_matches!(err, RuntimeError::SessionBusy(_));

        // The winner's job is still current; only one job enqueued.
        let row = f.store.get_session(&f.session_id).unwrap().unwrap();
        assert_eq!(row.current_job_id.as_deref(), Some(handle.job_id.as_str()));
        assert_eq!(f.queue.jobs.lock().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_submits_have_one_winner() {
        let f = make_fixture();
        let orchestrator = Arc::new(f.orchestrator);

        let mut handles = Vec::new();
        for i in 0..4 {
            let orchestrator = Arc::clone(&orchestrator);
            let session_id = f.session_id.clone();
            handles.push(tokio::spawn(async move {
                orchestrator
                    .submit(&session_id, &format!("p{i}"), SubmitOptions::default())
                    .await
            }));
        }

        let mut winners = Vec::new();
        let mut busy = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(job_handle) => winners.push(job_handle),
                Err(RuntimeError::SessionBusy(_)) => busy += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(winners.len(), 1);
        assert_eq!(busy, 3);

        let row = f.store.get_session(&f.session_id).unwrap().unwrap();
        assert_eq!(
            row.current_job_id.as_deref(),
            Some(winners[0].job_id.as_str())
        );
    }

    #[tokio::test]
    async fn submit_unknown_session() {
        let f = make_fixture();
        let err = f
            .orchestrator
            .submit("sess_nope", "p", SubmitOptions::default())
            .await
            .unwrap_err();
        assert_matches!(err, RuntimeError::SessionNotFound(_));
    }

    #[tokio::test]
    async fn enqueue_failure_rolls_back_admission() {
        let f = make_fixture();
        f.queue.fail_next.store(true, Ordering::SeqCst);

        let err = f
            .orchestrator
            .submit(&f.session_id, "p", SubmitOptions::default())
            .await
            .unwrap_err();
        assert_matches!(err, RuntimeError::EnqueueFailed(_));

        // Session is idle again with no job id, and re-submittable.
        let row = f.store.get_session(&f.session_id).unwrap().unwrap();
        assert!(!row.is_working);
        assert!(row.current_job_id.is_none());
        assert_eq!(f.orchestrator.in_flight_count(), 0);

        let handle = f
            .orchestrator
            .submit(&f.session_id, "retry", SubmitOptions::default())
            .await
            .unwrap();
        assert!(f.streamer.is_open(&handle.job_id));
    }

    #[tokio::test]
    async fn terminal_completion_reconciles_session() {
        let f = make_fixture();
        let handle = f
            .orchestrator
            .submit(&f.session_id, "p", SubmitOptions::default())
            .await
            .unwrap();

        f.orchestrator
            .on_job_terminal(handle.job_id.as_str(), &completed_outcome(42))
            .unwrap();

        let row = f.store.get_session(&f.session_id).unwrap().unwrap();
        assert!(!row.is_working);
        assert!(row.current_job_id.is_none());
        assert_eq!(row.last_job_status.as_deref(), Some("completed"));
        assert_eq!(row.token_count, 42);
        assert_eq!(row.message_count, 2);

        let messages = f
            .store
            .list_messages(&f.session_id, &ListMessagesOptions::default())
            .unwrap();
        assert_eq!(messages[1].role, MessageRole::Assistant);
        assert_eq!(messages[1].content, "all done");
        assert_eq!(messages[1].provider_session_id.as_deref(), Some("thread_9"));
    }

    #[tokio::test]
    async fn terminal_failure_records_error_message() {
        let f = make_fixture();
        let handle = f
            .orchestrator
            .submit(&f.session_id, "p", SubmitOptions::default())
            .await
            .unwrap();

        let outcome = JobOutcome::Failed(JobFailure::new("tool exploded", Some("E_BOOM")));
        f.orchestrator
            .on_job_terminal(handle.job_id.as_str(), &outcome)
            .unwrap();

        let row = f.store.get_session(&f.session_id).unwrap().unwrap();
        assert_eq!(row.last_job_status.as_deref(), Some("failed"));
        assert_eq!(row.token_count, 0);

        let messages = f
            .store
            .list_messages(&f.session_id, &ListMessagesOptions::default())
            .unwrap();
        assert_eq!(messages[1].content, "tool exploded");
    }

    #[tokio::test]
    async fn stale_terminal_is_ignored() {
        let f = make_fixture();
        let handle = f
            .orchestrator
            .submit(&f.session_id, "p", SubmitOptions::default())
            .await
            .unwrap();

        // A terminal for some other job leaves everything unchanged.
        f.orchestrator
            .on_job_terminal("job_stale", &completed_outcome(99))
            .unwrap();

        let row = f.store.get_session(&f.session_id).unwrap().unwrap();
        assert!(row.is_working);
        assert_eq!(row.current_job_id.as_deref(), Some(handle.job_id.as_str()));
        assert_eq!(row.token_count, 0);
        assert_eq!(row.message_count, 1);
    }

    #[tokio::test]
    async fn duplicate_terminal_applies_once() {
        let f = make_fixture();
        let handle = f
            .orchestrator
            .submit(&f.session_id, "p", SubmitOptions::default())
            .await
            .unwrap();

        f.orchestrator
            .on_job_terminal(handle.job_id.as_str(), &completed_outcome(42))
            .unwrap();
        f.orchestrator
            .on_job_terminal(handle.job_id.as_str(), &completed_outcome(42))
            .unwrap();

        let row = f.store.get_session(&f.session_id).unwrap().unwrap();
        assert_eq!(row.token_count, 42, "counters applied exactly once");
        assert_eq!(row.message_count, 2);
    }

    #[tokio::test]
    async fn cancel_marks_intent_and_records_cancelled() {
        let f = make_fixture();
        let handle = f
            .orchestrator
            .submit(&f.session_id, "p", SubmitOptions::default())
            .await
            .unwrap();

        assert!(f.orchestrator.cancel(&f.session_id).unwrap());
        assert_eq!(
            f.queue.cancelled.lock().clone(),
            vec![handle.job_id.as_str().to_owned()]
        );

        // The runner observed cancellation and reported a failure; the
        // session records it as cancelled, not failed.
        let outcome = JobOutcome::Failed(JobFailure::new("interrupted", Some("CANCELLED")));
        f.orchestrator
            .on_job_terminal(handle.job_id.as_str(), &outcome)
            .unwrap();

        let row = f.store.get_session(&f.session_id).unwrap().unwrap();
        assert_eq!(row.last_job_status.as_deref(), Some("cancelled"));
        assert!(!row.is_working);
    }

    #[tokio::test]
    async fn cancel_idle_session_returns_false() {
        let f = make_fixture();
        assert!(!f.orchestrator.cancel(&f.session_id).unwrap());
    }

    #[tokio::test]
    async fn cancel_unknown_session() {
        let f = make_fixture();
        let err = f.orchestrator.cancel("sess_nope").unwrap_err();
        assert_matches!(err, RuntimeError::SessionNotFound(_));
    }

    #[tokio::test]
    async fn session_cycles_through_multiple_jobs() {
        let f = make_fixture();
        for turn in 0..3 {
            let handle = f
                .orchestrator
                .submit(&f.session_id, &format!("p{turn}"), SubmitOptions::default())
                .await
                .unwrap();
            f.orchestrator
                .on_job_terminal(handle.job_id.as_str(), &completed_outcome(10))
                .unwrap();
        }

        let row = f.store.get_session(&f.session_id).unwrap().unwrap();
        assert_eq!(row.token_count, 30);
        assert_eq!(row.message_count, 6);
        assert!(!row.is_working);
    }
}

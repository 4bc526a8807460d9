//! Service composition root.
//!
//! Wires every component — store, queue, streamer, orchestrator, token
//! service — from settings, with an explicit lifecycle: construct with
//! [`RelayService::new`], call [`start`](RelayService::start), and
//! [`shutdown`](RelayService::shutdown) to drain. No ambient global state.

use std::sync::Arc;

use relay_auth::{MemoryRevocationStore, TokenService, TokenServiceConfig};
use relay_core::events::JobEvent;
use relay_core::ids::JobId;
use relay_queue::queue::{JobQueue, TerminalEvent};
use relay_queue::runner::{JobEventSink, JobRunner};
use relay_queue::worker::{InProcessQueue, QueueConfig};
use relay_settings::RelaySettings;
use relay_store::connection::ConnectionConfig;
use relay_store::store::{SessionStore, SqliteSessionStore};
use relay_stream::{EventStreamer, StreamConfig};
use tokio::sync::mpsc;
use tracing::{error, warn};

use crate::errors::RuntimeError;
use crate::orchestrator::Orchestrator;
use crate::shutdown::ShutdownCoordinator;

/// Adapter publishing queue-worker events into the streamer.
pub struct StreamerSink {
    streamer: Arc<EventStreamer>,
}

impl StreamerSink {
    /// Wrap a streamer.
    #[must_use]
    pub fn new(streamer: Arc<EventStreamer>) -> Self {
        Self { streamer }
    }
}

impl JobEventSink for StreamerSink {
    fn publish(&self, job_id: &JobId, event: JobEvent) {
        if let Err(e) = self.streamer.publish(job_id, event) {
            // A stream can be gone after an admission rollback raced the
            // worker; losing the event is correct, the session record is
            // the source of truth.
            warn!(job_id = %job_id, error = %e, "event dropped, stream not open");
        }
    }

    fn finish(&self, job_id: &JobId) {
        self.streamer.finish_job(job_id);
    }
}

/// The assembled Relay core.
pub struct RelayService {
    store: Arc<dyn SessionStore>,
    queue: Arc<InProcessQueue>,
    streamer: Arc<EventStreamer>,
    orchestrator: Arc<Orchestrator>,
    tokens: Arc<TokenService>,
    shutdown: ShutdownCoordinator,
    terminal_rx: parking_lot::Mutex<Option<mpsc::UnboundedReceiver<TerminalEvent>>>,
}

impl std::fmt::Debug for RelayService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayService").finish_non_exhaustive()
    }
}

impl RelayService {
    /// Construct every component from settings.
    ///
    /// Auth secrets are required: set `RELAY_ACCESS_SECRET` /
    /// `RELAY_REFRESH_SECRET` (or the settings file equivalents).
    pub fn new(
        settings: &RelaySettings,
        runner: Arc<dyn JobRunner>,
    ) -> Result<Self, RuntimeError> {
        let (Some(access_secret), Some(refresh_secret)) = (
            settings.auth.access_secret.clone(),
            settings.auth.refresh_secret.clone(),
        ) else {
            return Err(RuntimeError::Internal(
                "auth secrets not configured; set RELAY_ACCESS_SECRET and RELAY_REFRESH_SECRET"
                    .into(),
            ));
        };

        let store: Arc<dyn SessionStore> = if settings.store.db_path == ":memory:" {
            Arc::new(SqliteSessionStore::open_in_memory()?)
        } else {
            Arc::new(SqliteSessionStore::open(
                &settings.store.db_path,
                &ConnectionConfig {
                    pool_size: settings.store.pool_size,
                    busy_timeout_ms: settings.store.busy_timeout_ms,
                },
            )?)
        };

        let streamer = Arc::new(EventStreamer::new(StreamConfig {
            replay_max_events: settings.stream.replay_max_events,
            replay_max_age: std::time::Duration::from_millis(settings.stream.replay_max_age_ms),
            subscriber_buffer: settings.stream.subscriber_buffer,
            max_subscriber_drops: settings.stream.max_subscriber_drops,
            terminal_grace: std::time::Duration::from_millis(settings.stream.terminal_grace_ms),
        }));

        let sink = Arc::new(StreamerSink::new(Arc::clone(&streamer)));
        let (queue, terminal_rx) = InProcessQueue::new(
            runner,
            sink,
            QueueConfig {
                workers: settings.queue.workers,
            },
        );

        let orchestrator = Arc::new(Orchestrator::new(
            Arc::clone(&store),
            Arc::clone(&queue) as Arc<dyn JobQueue>,
            Arc::clone(&streamer),
        ));

        let tokens = Arc::new(TokenService::new(
            &TokenServiceConfig {
                access_secret,
                refresh_secret,
                access_ttl_secs: settings.auth.access_ttl_secs,
                refresh_ttl_secs: settings.auth.refresh_ttl_secs,
            },
            Arc::new(MemoryRevocationStore::new()),
        ));

        Ok(Self {
            store,
            queue,
            streamer,
            orchestrator,
            tokens,
            shutdown: ShutdownCoordinator::new(),
            terminal_rx: parking_lot::Mutex::new(Some(terminal_rx)),
        })
    }

    /// Start workers and the terminal-event pump. Idempotent.
    pub fn start(&self) {
        self.queue.start();

        let Some(mut terminal_rx) = self.terminal_rx.lock().take() else {
            return;
        };
        let orchestrator = Arc::clone(&self.orchestrator);
        let token = self.shutdown.token();
        self.shutdown.register(tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = token.cancelled() => {
                        // Drain whatever the workers already reported.
                        while let Ok(event) = terminal_rx.try_recv() {
                            reconcile(&orchestrator, &event);
                        }
                        break;
                    }
                    event = terminal_rx.recv() => match event {
                        Some(event) => reconcile(&orchestrator, &event),
                        None => break,
                    }
                }
            }
        }));
    }

    /// Drain the queue, stop the pump, and wait for background tasks.
    pub async fn shutdown(&self) {
        self.queue.drain().await;
        self.shutdown.graceful(None).await;
    }

    /// The orchestrator (submit / cancel surface).
    #[must_use]
    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// The session store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// The event streamer (subscribe surface).
    #[must_use]
    pub fn streamer(&self) -> &Arc<EventStreamer> {
        &self.streamer
    }

    /// The token service.
    #[must_use]
    pub fn tokens(&self) -> &Arc<TokenService> {
        &self.tokens
    }

    /// Point-in-time queue metrics.
    #[must_use]
    pub fn queue_metrics(&self) -> relay_queue::metrics::QueueMetrics {
        self.queue.metrics()
    }
}

fn reconcile(orchestrator: &Orchestrator, event: &TerminalEvent) {
    if let Err(e) = orchestrator.on_job_terminal(event.job_id.as_str(), &event.outcome) {
        error!(
            job_id = %event.job_id,
            session_id = %event.session_id,
            error = %e,
            "terminal reconciliation failed"
        );
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

//! Zip worker: polls the request queue and processes one message at a time.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use notekeeper_core::defaults::{
    EVENT_BUS_CAPACITY, ZIP_LEASE_MARGIN_MS, ZIP_POISON_WARN_THRESHOLD, ZIP_POLL_INTERVAL_MS,
    ZIP_VISIBILITY_TIMEOUT_SECS,
};
use notekeeper_core::{BlobStore, Error, LeasedMessage, MessageQueue, Result, ZipRequestMessage};

use crate::processor::{NoOpReason, ZipOutcome, ZipProcessor};

/// Configuration for the zip worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Sleep between polls when the queue is empty, in milliseconds.
    pub poll_interval_ms: u64,
    /// How long a received message stays hidden from other receivers.
    pub visibility_timeout_secs: u64,
    /// An attempt must finish this long before its lease runs out.
    pub lease_margin_ms: u64,
    /// Dequeue count at which a message is logged as suspected poison.
    pub poison_warn_threshold: i32,
    /// Whether to process messages at all.
    pub enabled: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: ZIP_POLL_INTERVAL_MS,
            visibility_timeout_secs: ZIP_VISIBILITY_TIMEOUT_SECS,
            lease_margin_ms: ZIP_LEASE_MARGIN_MS,
            poison_warn_threshold: ZIP_POISON_WARN_THRESHOLD,
            enabled: true,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `ZIP_WORKER_ENABLED` | `true` | Enable/disable zip processing |
    /// | `ZIP_POLL_INTERVAL_MS` | `5000` | Polling interval when queue is empty |
    /// | `ZIP_VISIBILITY_TIMEOUT_SECS` | `30` | Lease length per receive |
    /// | `ZIP_LEASE_MARGIN_MS` | `2000` | Safety margin before lease expiry |
    /// | `ZIP_POISON_WARN_THRESHOLD` | `5` | Dequeue count that triggers a WARN |
    pub fn from_env() -> Self {
        let enabled = std::env::var("ZIP_WORKER_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let poll_interval_ms = env_parse("ZIP_POLL_INTERVAL_MS").unwrap_or(ZIP_POLL_INTERVAL_MS);
        let visibility_timeout_secs = env_parse("ZIP_VISIBILITY_TIMEOUT_SECS")
            .unwrap_or(ZIP_VISIBILITY_TIMEOUT_SECS)
            .max(1);
        let lease_margin_ms = env_parse("ZIP_LEASE_MARGIN_MS").unwrap_or(ZIP_LEASE_MARGIN_MS);
        let poison_warn_threshold =
            env_parse("ZIP_POISON_WARN_THRESHOLD").unwrap_or(ZIP_POISON_WARN_THRESHOLD);

        Self {
            poll_interval_ms,
            visibility_timeout_secs,
            lease_margin_ms,
            poison_warn_threshold,
            enabled,
        }
    }

    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn with_visibility_timeout(mut self, secs: u64) -> Self {
        self.visibility_timeout_secs = secs;
        self
    }

    pub fn with_lease_margin(mut self, ms: u64) -> Self {
        self.lease_margin_ms = ms;
        self
    }

    pub fn with_poison_warn_threshold(mut self, count: i32) -> Self {
        self.poison_warn_threshold = count;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_secs)
    }

    /// Time budget for one attempt: the lease minus the safety margin.
    pub fn attempt_deadline(&self) -> Duration {
        self.visibility_timeout()
            .saturating_sub(Duration::from_millis(self.lease_margin_ms))
    }

    /// Reject configurations that would time out every attempt.
    pub fn validate(&self) -> Result<()> {
        if self.attempt_deadline().is_zero() {
            return Err(Error::Config(format!(
                "ZIP_LEASE_MARGIN_MS ({}) must be smaller than ZIP_VISIBILITY_TIMEOUT_SECS ({}s)",
                self.lease_margin_ms, self.visibility_timeout_secs
            )));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Event emitted by the zip worker.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// Worker started.
    WorkerStarted,
    /// A message was leased from the queue.
    MessageReceived { message_id: Uuid, dequeue_count: i32 },
    /// An archive was uploaded (and its message deleted, unless `LeaseLost`
    /// follows).
    ZipCompleted {
        message_id: Uuid,
        note_id: Uuid,
        zip_file_id: String,
        entry_count: usize,
        length: u64,
    },
    /// The request needed no archive.
    ZipSkipped {
        message_id: Uuid,
        note_id: Uuid,
        reason: NoOpReason,
    },
    /// The attempt failed; the message stays on the queue.
    ///
    /// `permanent` is set when redelivery cannot succeed, such as an
    /// undecodable body.
    MessageFailed {
        message_id: Uuid,
        error: String,
        permanent: bool,
    },
    /// Deleting a finished message failed; it will be redelivered.
    LeaseLost { message_id: Uuid, error: String },
    /// Worker stopped.
    WorkerStopped,
}

/// Handle for controlling a running worker.
pub struct WorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<WorkerEvent>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    /// Signal the worker to stop and wait for the in-flight message, if any,
    /// to finish.
    pub async fn shutdown(self) -> Result<()> {
        // The loop may already have exited (disabled worker); that is fine.
        let _ = self.shutdown_tx.send(()).await;
        self.join
            .await
            .map_err(|e| Error::Internal(format!("Zip worker task failed: {e}")))
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_rx.resubscribe()
    }
}

/// Worker that drains the zip request queue.
pub struct ZipWorker {
    queue: Arc<dyn MessageQueue>,
    processor: ZipProcessor,
    config: WorkerConfig,
    event_tx: broadcast::Sender<WorkerEvent>,
}

impl ZipWorker {
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        blobs: Arc<dyn BlobStore>,
        config: WorkerConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self {
            queue,
            processor: ZipProcessor::new(blobs),
            config,
            event_tx,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }

    /// Start the worker and return a handle for control.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let event_rx = self.event_tx.subscribe();

        let join = tokio::spawn(async move {
            self.run(&mut shutdown_rx).await;
        });

        WorkerHandle {
            shutdown_tx,
            event_rx,
            join,
        }
    }

    /// Poll until shutdown. Only sleeps when the queue is empty or unreachable.
    #[instrument(skip(self, shutdown_rx), fields(subsystem = "jobs", component = "worker", queue = %self.queue.name()))]
    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        if !self.config.enabled {
            info!("Zip worker is disabled, not starting");
            return;
        }

        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            visibility_timeout_secs = self.config.visibility_timeout_secs,
            lease_margin_ms = self.config.lease_margin_ms,
            "Zip worker started"
        );
        let _ = self.event_tx.send(WorkerEvent::WorkerStarted);

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);

        loop {
            if shutdown_rx.try_recv().is_ok() {
                info!("Zip worker received shutdown signal");
                break;
            }

            match self.poll_once().await {
                // Go straight back for the next message.
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => {
                    error!(error = %e, "Failed to receive from zip queue");
                }
            }

            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Zip worker received shutdown signal");
                    break;
                }
                _ = sleep(poll_interval) => {}
            }
        }

        let _ = self.event_tx.send(WorkerEvent::WorkerStopped);
        info!("Zip worker stopped");
    }

    /// Receive and handle at most one message.
    ///
    /// Returns `Ok(false)` when the queue was empty. Processing failures are
    /// handled internally; only a failed receive is returned as an error.
    pub async fn poll_once(&self) -> Result<bool> {
        match self.queue.receive(self.config.visibility_timeout()).await? {
            Some(leased) => {
                self.handle_message(leased).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn handle_message(&self, leased: LeasedMessage) {
        let start = Instant::now();
        let message_id = leased.message_id();
        let dequeue_count = leased.dequeue_count;

        let _ = self.event_tx.send(WorkerEvent::MessageReceived {
            message_id,
            dequeue_count,
        });
        debug!(
            %message_id,
            dequeue_count,
            visible_until = %leased.visible_until,
            "Leased zip request"
        );

        if self.config.poison_warn_threshold > 0
            && dequeue_count >= self.config.poison_warn_threshold
        {
            warn!(
                %message_id,
                dequeue_count,
                threshold = self.config.poison_warn_threshold,
                "Zip request has been delivered repeatedly; suspected poison message"
            );
        }

        let request = match ZipRequestMessage::decode(&leased.body) {
            Ok(request) => request,
            Err(e) => {
                error!(
                    %message_id,
                    dequeue_count,
                    permanent = e.is_permanent(),
                    error = %e,
                    "Rejected zip request body; leaving it for redelivery"
                );
                let _ = self.event_tx.send(WorkerEvent::MessageFailed {
                    message_id,
                    error: e.to_string(),
                    permanent: e.is_permanent(),
                });
                return;
            }
        };

        let outcome = self.run_attempt(&request).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            ZipOutcome::Completed {
                metadata,
                entry_count,
            } => {
                let deleted = self.delete_message(&leased).await;
                info!(
                    %message_id,
                    note_id = %request.note_id,
                    zip_file_id = %request.zip_file_id,
                    dequeue_count,
                    entry_count,
                    length = metadata.length,
                    duration_ms,
                    deleted,
                    "Zip request completed"
                );
                let _ = self.event_tx.send(WorkerEvent::ZipCompleted {
                    message_id,
                    note_id: request.note_id,
                    zip_file_id: request.zip_file_id.clone(),
                    entry_count,
                    length: metadata.length,
                });
            }
            ZipOutcome::NoOp(reason) => {
                let deleted = self.delete_message(&leased).await;
                info!(
                    %message_id,
                    note_id = %request.note_id,
                    zip_file_id = %request.zip_file_id,
                    %reason,
                    duration_ms,
                    deleted,
                    "Zip request skipped"
                );
                let _ = self.event_tx.send(WorkerEvent::ZipSkipped {
                    message_id,
                    note_id: request.note_id,
                    reason,
                });
            }
            ZipOutcome::Failed(e) => {
                error!(
                    %message_id,
                    note_id = %request.note_id,
                    zip_file_id = %request.zip_file_id,
                    dequeue_count,
                    duration_ms,
                    permanent = e.is_permanent(),
                    error = %e,
                    "Zip request failed; leaving it for redelivery"
                );
                let _ = self.event_tx.send(WorkerEvent::MessageFailed {
                    message_id,
                    error: e.to_string(),
                    permanent: e.is_permanent(),
                });
            }
        }
    }

    /// Run the processor on its own task under the lease deadline.
    ///
    /// A panic inside the attempt surfaces as a join error and is treated as
    /// a failure; the loop keeps running.
    async fn run_attempt(&self, request: &ZipRequestMessage) -> ZipOutcome {
        let deadline = self.config.attempt_deadline();
        let processor = self.processor.clone();
        let owned = request.clone();
        let mut task = tokio::spawn(async move { processor.process(&owned).await });

        match tokio::time::timeout(deadline, &mut task).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(join_err)) => {
                ZipOutcome::Failed(Error::Internal(format!("zip attempt aborted: {join_err}")))
            }
            Err(_) => {
                task.abort();
                ZipOutcome::Failed(Error::LeaseExpired(deadline.as_millis() as u64))
            }
        }
    }

    async fn delete_message(&self, leased: &LeasedMessage) -> bool {
        match self.queue.delete(&leased.lease).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    message_id = %leased.message_id(),
                    dequeue_count = leased.dequeue_count,
                    error = %e,
                    "Failed to delete finished zip request; it will be redelivered"
                );
                let _ = self.event_tx.send(WorkerEvent::LeaseLost {
                    message_id: leased.message_id(),
                    error: e.to_string(),
                });
                false
            }
        }
    }
}

/// Builder for creating a zip worker.
pub struct WorkerBuilder {
    queue: Arc<dyn MessageQueue>,
    blobs: Arc<dyn BlobStore>,
    config: WorkerConfig,
}

impl WorkerBuilder {
    pub fn new(queue: Arc<dyn MessageQueue>, blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            queue,
            blobs,
            config: WorkerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the worker, rejecting an unusable configuration.
    pub fn build(self) -> Result<ZipWorker> {
        self.config.validate()?;
        Ok(ZipWorker::new(self.queue, self.blobs, self.config))
    }
}

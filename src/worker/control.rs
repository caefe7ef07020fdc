//! Worker loop: polls the queue, reconciles deliveries with trackers, runs
//! job commands, retires messages.

use opentelemetry::KeyValue;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{Instrument, error, info, warn};

use super::runner::{RunOutcome, run_command};
use crate::coordinator::{Coordinator, Resumed};
use crate::db::Db;
use crate::db::pgmq::QueueMessage;
use crate::error::Result;
use crate::model::ProviderJobId;
use crate::queue::QueuedJob;
use crate::registry::JobRegistry;
use crate::telemetry::job::{record_decision, start_perform_span};
use crate::telemetry::metrics;

/// Configuration for the worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Visibility timeout (seconds) for pgmq reads. A failed job becomes
    /// visible again, and is retried, after this long.
    pub visibility_timeout: i32,
    /// Delay between polls when the queue is empty.
    pub poll_interval: Duration,
    /// Deliveries after which a failing job is archived instead of retried.
    pub max_attempts: i32,
    /// Maximum jobs executing at once.
    pub max_concurrent: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            visibility_timeout: 60,
            poll_interval: Duration::from_secs(1),
            max_attempts: 5,
            max_concurrent: 4,
        }
    }
}

/// One unit of `max_concurrent`, returned when dropped, including when the
/// job task panics.
struct Slot(Arc<AtomicUsize>);

impl Slot {
    fn acquire(active: &Arc<AtomicUsize>) -> Self {
        active.fetch_add(1, Ordering::Relaxed);
        Self(Arc::clone(active))
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Pulls jobs from one queue and executes them under the coordinator.
#[derive(Clone)]
pub struct Worker {
    db: Arc<Db>,
    coordinator: Coordinator<Db, Db>,
    registry: Arc<JobRegistry>,
    queue_name: String,
    config: WorkerConfig,
    shutdown: Arc<Notify>,
    active: Arc<AtomicUsize>,
}

impl Worker {
    pub fn new(
        db: Arc<Db>,
        coordinator: Coordinator<Db, Db>,
        registry: Arc<JobRegistry>,
        queue_name: impl Into<String>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            db,
            coordinator,
            registry,
            queue_name: queue_name.into(),
            config,
            shutdown: Arc::new(Notify::new()),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Signal the worker to stop polling. Running jobs finish on their own.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// Poll until shutdown.
    pub async fn run(&self) -> Result<()> {
        info!(queue = %self.queue_name, "worker started");

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("worker shutting down");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }

            while self.active.load(Ordering::Relaxed) < self.config.max_concurrent {
                let msg = match self
                    .db
                    .read_from_queue(&self.queue_name, self.config.visibility_timeout)
                    .await
                {
                    Ok(Some(msg)) => msg,
                    Ok(None) => break,
                    Err(e) => {
                        error!("queue read error: {e}");
                        break;
                    }
                };

                let slot = Slot::acquire(&self.active);
                let worker = self.clone();
                tokio::spawn(async move {
                    let _slot = slot;
                    let msg_id = msg.msg_id;
                    if let Err(e) = worker.handle(msg).await {
                        error!(msg_id, "job handling error: {e}");
                    }
                });
            }
        }
    }

    /// Read and handle one message inline. Returns false if the queue had
    /// nothing visible.
    pub async fn process_next(&self) -> Result<bool> {
        let msg = self
            .db
            .read_from_queue(&self.queue_name, self.config.visibility_timeout)
            .await?;
        match msg {
            Some(msg) => {
                self.handle(msg).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn handle(&self, msg: QueueMessage) -> Result<()> {
        let job: QueuedJob = match serde_json::from_value(msg.message.clone()) {
            Ok(job) => job,
            Err(e) => {
                warn!(msg_id = msg.msg_id, "unreadable job payload, archiving: {e}");
                return self.db.archive_message(&self.queue_name, msg.msg_id).await;
            }
        };
        let provider_job_id = ProviderJobId::from(msg.msg_id);
        let span = start_perform_span(&job.job_type, &job.key, provider_job_id.as_str());

        async {
            // Unknown job types stay queued; the visibility timeout hands
            // them to a worker that knows them.
            let Some(descriptor) = self.registry.get(&job.job_type) else {
                warn!(job_type = %job.job_type, "unknown job type, leaving queued");
                return Ok(());
            };
            let Some(command) = self.registry.command_for(&job.job_type) else {
                warn!(job_type = %job.job_type, "no command for job type, leaving queued");
                return Ok(());
            };

            let resumed = self.coordinator.resume(&job.key, &provider_job_id).await?;
            if let Resumed::Superseded(current) = &resumed {
                if descriptor.policy().debounced {
                    info!(
                        key = %job.key,
                        superseded_by = ?current.provider_job_id,
                        "superseded by a later submission, skipping"
                    );
                    record_decision(&span, "superseded");
                    metrics::job_duration_ms().record(
                        0.0,
                        &[
                            KeyValue::new("job_type", job.job_type.clone()),
                            KeyValue::new("result", "skipped"),
                        ],
                    );
                    return self.db.delete_message(&self.queue_name, msg.msg_id).await;
                }
            }
            record_decision(&span, "perform");

            let tracker = resumed.into_owned_tracker();
            let outcome = self
                .coordinator
                .perform(tracker, || run_command(command, &job, &provider_job_id))
                .await;

            metrics::job_duration_ms().record(
                outcome.duration_ms() as f64,
                &[
                    KeyValue::new("job_type", job.job_type.clone()),
                    KeyValue::new("result", if outcome.is_success() { "ok" } else { "error" }),
                ],
            );

            match outcome {
                RunOutcome::Completed { duration_ms } => {
                    info!(key = %job.key, duration_ms, "job completed");
                    self.db.archive_message(&self.queue_name, msg.msg_id).await?;
                }
                RunOutcome::Failed { error, duration_ms } if msg.read_ct >= self.config.max_attempts => {
                    error!(
                        key = %job.key,
                        %error,
                        duration_ms,
                        attempts = msg.read_ct,
                        "job failed, attempts exhausted"
                    );
                    self.db.archive_message(&self.queue_name, msg.msg_id).await?;
                }
                RunOutcome::Failed { error, duration_ms } => {
                    // Left in the queue; visible again after the timeout.
                    warn!(
                        key = %job.key,
                        %error,
                        duration_ms,
                        attempt = msg.read_ct,
                        "job failed, will retry"
                    );
                }
            }

            Ok(())
        }
        .instrument(span.clone())
        .await
    }
}

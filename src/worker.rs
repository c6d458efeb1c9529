//! Worker pool
//!
//! Blocking dequeue loop with bounded concurrency. Each dequeued job runs
//! the orchestrator under a semaphore permit; cleanup of the processing set
//! and payload key always happens, whatever the execution outcome.

use crate::broker::{keys, CacheBroker};
use crate::error::PipelineError;
use crate::models::{JobStatus, JobUpdate, QueuePayload};
use crate::pipeline::Orchestrator;
use crate::queue::JobQueue;
use crate::store::JobStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

/// Blocking-pop wait, short enough for shutdown signals to be observed
const POP_TIMEOUT_SECS: u64 = 5;
/// Back-off after an unexpected loop error
const LOOP_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Dequeues jobs and drives the orchestrator with bounded concurrency
pub struct WorkerPool {
    queue: JobQueue,
    store: Arc<dyn JobStore>,
    broker: Arc<dyn CacheBroker>,
    orchestrator: Arc<Orchestrator>,
    semaphore: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(
        queue: JobQueue,
        store: Arc<dyn JobStore>,
        broker: Arc<dyn CacheBroker>,
        orchestrator: Arc<Orchestrator>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            queue,
            store,
            broker,
            orchestrator,
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
        }
    }

    /// Main worker loop; runs until the surrounding task is cancelled
    pub async fn run(self: Arc<Self>) {
        info!(queue_name = keys::QUEUE_NAME, "worker started");
        loop {
            match self.queue.blocking_pop(POP_TIMEOUT_SECS).await {
                Ok(Some(payload)) => {
                    // Acquire before spawning so the pop loop applies
                    // backpressure once all slots are busy.
                    let permit = match self.semaphore.clone().acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => return,
                    };
                    let pool = self.clone();
                    tokio::spawn(async move {
                        let job_id = payload.job_id;
                        pool.process(payload).await;
                        if let Err(e) = pool.queue.complete(job_id).await {
                            error!(job_id = %job_id, error = %e, "failed to clean up job entry");
                        }
                        drop(permit);
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    error!(error = %e, "error in worker loop");
                    tokio::time::sleep(LOOP_RETRY_DELAY).await;
                }
            }
        }
    }

    /// Process one dequeued payload
    async fn process(&self, payload: QueuePayload) {
        let job_id = payload.job_id;
        info!(job_id = %job_id, user_id = %payload.user_id, "processing job");

        if self.cancelled_before_start(&payload).await {
            return;
        }

        match self.orchestrator.execute(&payload).await {
            Ok(()) => info!(job_id = %job_id, "job processed successfully"),
            Err(err @ PipelineError::Retryable(_)) => {
                // Leave failure state unwritten; the queue's visibility
                // policy may re-deliver the job.
                warn!(job_id = %job_id, error = %err, "retryable error, job left for re-delivery");
            }
            Err(err) => {
                // The orchestrator already wrote the terminal state.
                error!(job_id = %job_id, error = %err, "job failed");
            }
        }
    }

    /// Dequeue-time cancellation pre-check.
    ///
    /// Covers both the marker set while processing and the stale list entry
    /// left behind by a cancel of a still-queued job (whose row is already
    /// terminal).
    async fn cancelled_before_start(&self, payload: &QueuePayload) -> bool {
        let job_id = payload.job_id;

        match self.broker.get(&keys::job_cancel(job_id)).await {
            Ok(Some(_)) => {
                info!(job_id = %job_id, "job cancelled before processing");
                let update = JobUpdate {
                    status: Some(JobStatus::Failed),
                    error_message: Some("Job cancelled by user".to_string()),
                    ..JobUpdate::touched()
                };
                if let Err(e) = self.store.update_job(job_id, &update).await {
                    error!(job_id = %job_id, error = %e, "failed to mark cancelled job");
                }
                return true;
            }
            Ok(None) => {}
            Err(e) => warn!(job_id = %job_id, error = %e, "failed to check cancellation flag"),
        }

        match self.store.get_job(job_id).await {
            Ok(Some(job)) if job.status.is_terminal() => {
                info!(job_id = %job_id, status = job.status.as_str(), "skipping stale queue entry");
                true
            }
            Ok(Some(_)) => false,
            Ok(None) => {
                warn!(job_id = %job_id, "dequeued job has no row, skipping");
                true
            }
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "failed to load job for pre-check");
                false
            }
        }
    }
}

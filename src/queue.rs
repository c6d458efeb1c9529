//! Job queue
//!
//! Durable FIFO over a broker list, with a processing set for in-flight work
//! and a 15-minute payload key per job for crash-resume retrieval.

use crate::broker::{keys, CacheBroker};
use crate::error::PipelineResult;
use crate::models::QueuePayload;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

const PAYLOAD_TTL_SECS: u64 = 900;

/// FIFO enqueue/dequeue with a separate processing set
#[derive(Clone)]
pub struct JobQueue {
    broker: Arc<dyn CacheBroker>,
}

impl JobQueue {
    pub fn new(broker: Arc<dyn CacheBroker>) -> Self {
        Self { broker }
    }

    /// Push a payload onto the queue head and set its crash-resume key
    pub async fn enqueue(&self, payload: &QueuePayload) -> PipelineResult<()> {
        let json = serde_json::to_string(payload)?;
        self.broker.lpush(&keys::queue_list(), &json).await?;
        self.broker
            .set(
                &keys::job_payload(payload.job_id),
                &json,
                Some(PAYLOAD_TTL_SECS),
            )
            .await?;
        info!(job_id = %payload.job_id, user_id = %payload.user_id, "job enqueued");
        Ok(())
    }

    /// Blocking pop from the queue tail.
    ///
    /// On a non-empty result the job is added to the processing set before
    /// the payload is returned; the caller owns the matching `complete`.
    pub async fn blocking_pop(&self, timeout_secs: u64) -> PipelineResult<Option<QueuePayload>> {
        let Some(raw) = self.broker.brpop(&keys::queue_list(), timeout_secs).await? else {
            return Ok(None);
        };
        let payload: QueuePayload = serde_json::from_str(&raw)?;
        self.broker
            .sadd(&keys::processing_set(), &payload.job_id.to_string())
            .await?;
        Ok(Some(payload))
    }

    /// Release a job from the processing set and drop its payload key.
    ///
    /// Called on both successful and failed completion.
    pub async fn complete(&self, job_id: Uuid) -> PipelineResult<()> {
        self.broker
            .srem(&keys::processing_set(), &job_id.to_string())
            .await?;
        self.broker.delete(&keys::job_payload(job_id)).await?;
        Ok(())
    }

    /// Remove a job before a worker picks it up (cancellation path).
    ///
    /// Only the payload key is deleted; the list entry lingers until a worker
    /// dequeues it and its cancellation pre-check fast-fails the job.
    pub async fn remove(&self, job_id: Uuid) -> PipelineResult<bool> {
        let removed = self.broker.delete(&keys::job_payload(job_id)).await?;
        info!(job_id = %job_id, removed, "job removed from queue");
        Ok(removed)
    }

    /// Current queue depth
    pub async fn depth(&self) -> PipelineResult<u64> {
        self.broker.llen(&keys::queue_list()).await
    }
}

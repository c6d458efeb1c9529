//! Event bus
//!
//! Per-job pub/sub channel carrying structured pipeline events. Publish
//! failures are logged and swallowed; progress distribution never fails a
//! job.

use crate::broker::{keys, CacheBroker, MessageStream};
use crate::error::PipelineResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;

/// Recognized pipeline event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Progress,
    StageUpdate,
    CostUpdate,
    Completed,
    Error,
    Heartbeat,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Progress => "progress",
            EventType::StageUpdate => "stage_update",
            EventType::CostUpdate => "cost_update",
            EventType::Completed => "completed",
            EventType::Error => "error",
            EventType::Heartbeat => "heartbeat",
        }
    }
}

/// JSON envelope emitted on `job_events:{job_id}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_type: EventType,
    pub data: Value,
}

/// Publishes pipeline events to per-job broker channels
#[derive(Clone)]
pub struct EventBus {
    broker: Arc<dyn CacheBroker>,
}

impl EventBus {
    pub fn new(broker: Arc<dyn CacheBroker>) -> Self {
        Self { broker }
    }

    /// Publish an event envelope; best-effort, errors are logged only
    pub async fn publish(&self, job_id: Uuid, event_type: EventType, data: Value) {
        let envelope = EventEnvelope { event_type, data };
        let payload = match serde_json::to_string(&envelope) {
            Ok(payload) => payload,
            Err(e) => {
                error!(job_id = %job_id, error = %e, "failed to serialize event");
                return;
            }
        };
        match self
            .broker
            .publish(&keys::job_events(job_id), &payload)
            .await
        {
            Ok(()) => {
                debug!(job_id = %job_id, event_type = event_type.as_str(), "event published")
            }
            Err(e) => {
                error!(
                    job_id = %job_id,
                    event_type = event_type.as_str(),
                    error = %e,
                    "failed to publish event"
                )
            }
        }
    }

    /// Subscribe to a job's event channel
    pub async fn subscribe(&self, job_id: Uuid) -> PipelineResult<MessageStream> {
        self.broker.subscribe(&keys::job_events(job_id)).await
    }
}

//! SSE hub
//!
//! In-process registry of live client subscriptions per job. Broadcasts fan
//! out from both the orchestrator (direct) and the broker event channel
//! (forwarded); a subscription's response stream merges its inbound buffer,
//! the broker subscription, and a heartbeat timer. A background sweeper
//! evicts connections that stopped heartbeating.
//!
//! The subscriptions mutex is never held across I/O: broadcasters snapshot
//! the list, drop the lock, then deliver.

use crate::broker::MessageStream;
use crate::events::EventEnvelope;
use crate::models::Job;
use futures::stream::{self, Stream, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

pub const MAX_CONNECTIONS_PER_JOB: usize = 10;
const BUFFER_CAPACITY: usize = 32;
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const SWEEP_INTERVAL: Duration = Duration::from_secs(30);
const STALE_AFTER: Duration = Duration::from_secs(60);

/// Subscription cap reached for a job
#[derive(Debug, Error)]
#[error("Maximum {MAX_CONNECTIONS_PER_JOB} connections per job exceeded")]
pub struct MaxConnections;

/// Format one SSE wire message
pub fn format_sse(event_type: &str, data: &Value) -> String {
    format!("event: {event_type}\ndata: {data}\n\n")
}

/// Initial `progress` payload replayed to a fresh subscription
pub fn initial_state(job: Option<&Job>) -> Value {
    match job {
        Some(job) => json!({
            "progress": job.progress,
            "stage": job.current_stage,
            "status": job.status.as_str(),
            "total_cost": job.total_cost,
        }),
        None => json!({
            "progress": 0,
            "stage": null,
            "status": "queued",
            "total_cost": 0,
        }),
    }
}

struct Subscription {
    id: u64,
    sender: mpsc::Sender<String>,
    last_heartbeat: Mutex<Instant>,
}

/// Registry of live SSE subscriptions, keyed by job
#[derive(Default)]
pub struct SseHub {
    connections: Mutex<HashMap<Uuid, Vec<Arc<Subscription>>>>,
    next_id: AtomicU64,
}

impl SseHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscription; fails once the per-job cap is reached.
    ///
    /// The hub keeps the only sender: evicting the entry closes the buffer
    /// and ends the owning response stream.
    fn add(&self, job_id: Uuid) -> Result<(u64, mpsc::Receiver<String>), MaxConnections> {
        let mut connections = self.connections.lock();
        let subs = connections.entry(job_id).or_default();
        if subs.len() >= MAX_CONNECTIONS_PER_JOB {
            return Err(MaxConnections);
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(BUFFER_CAPACITY);
        subs.push(Arc::new(Subscription {
            id,
            sender,
            last_heartbeat: Mutex::new(Instant::now()),
        }));
        debug!(job_id = %job_id, total = subs.len(), "SSE connection added");
        Ok((id, receiver))
    }

    /// Remove a subscription; idempotent
    fn remove(&self, job_id: Uuid, sub_id: u64) {
        let mut connections = self.connections.lock();
        if let Some(subs) = connections.get_mut(&job_id) {
            subs.retain(|s| s.id != sub_id);
            if subs.is_empty() {
                connections.remove(&job_id);
            }
            debug!(job_id = %job_id, sub_id, "SSE connection removed");
        }
    }

    /// Live subscription count for a job
    pub fn connection_count(&self, job_id: Uuid) -> usize {
        self.connections
            .lock()
            .get(&job_id)
            .map(|subs| subs.len())
            .unwrap_or(0)
    }

    /// Deliver one event to every subscription of a job.
    ///
    /// A full buffer drops the message for that subscription only.
    pub fn broadcast(&self, job_id: Uuid, event_type: &str, data: &Value) {
        let snapshot: Vec<Arc<Subscription>> = {
            let connections = self.connections.lock();
            match connections.get(&job_id) {
                Some(subs) => subs.clone(),
                None => return,
            }
        };
        let message = format_sse(event_type, data);
        for sub in snapshot {
            if sub.sender.try_send(message.clone()).is_err() {
                debug!(job_id = %job_id, sub_id = sub.id, "dropped event for slow subscriber");
            }
        }
    }

    /// Refresh a subscription's heartbeat timestamp
    fn touch(&self, job_id: Uuid, sub_id: u64) {
        let connections = self.connections.lock();
        if let Some(sub) = connections
            .get(&job_id)
            .and_then(|subs| subs.iter().find(|s| s.id == sub_id))
        {
            *sub.last_heartbeat.lock() = Instant::now();
        }
    }

    /// Evict subscriptions whose heartbeat is older than `stale_after`
    pub fn sweep(&self, stale_after: Duration) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        let mut connections = self.connections.lock();
        connections.retain(|_, subs| {
            subs.retain(|sub| {
                let stale = now.duration_since(*sub.last_heartbeat.lock()) > stale_after;
                if stale {
                    removed += 1;
                }
                !stale
            });
            !subs.is_empty()
        });
        removed
    }

    /// Open a subscription and return its SSE message stream.
    ///
    /// The stream starts with an initial `progress` replay of `initial`,
    /// then merges the hub buffer, the job's broker channel, and a 30-second
    /// inactivity heartbeat. Dropping the stream (client disconnect) removes
    /// the registration.
    pub fn subscribe(
        self: Arc<Self>,
        job_id: Uuid,
        initial: Value,
        broker_events: MessageStream,
    ) -> Result<impl Stream<Item = String> + Send + 'static, MaxConnections> {
        let (sub_id, receiver) = self.add(job_id)?;
        info!(job_id = %job_id, sub_id, "SSE stream started");

        let mut heartbeat = tokio::time::interval_at(
            Instant::now() + HEARTBEAT_INTERVAL,
            HEARTBEAT_INTERVAL,
        );
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let state = SubscriptionState {
            hub: self,
            job_id,
            sub_id,
            receiver,
            broker_events,
            broker_done: false,
            heartbeat,
        };

        let first = format_sse("progress", &initial);
        let rest = stream::unfold(state, |mut state| async move {
            loop {
                tokio::select! {
                    buffered = state.receiver.recv() => match buffered {
                        Some(message) => {
                            state.heartbeat.reset();
                            return Some((message, state));
                        }
                        // Sender dropped: the sweeper evicted us
                        None => return None,
                    },
                    forwarded = state.broker_events.next(), if !state.broker_done => {
                        match forwarded {
                            Some(raw) => {
                                if let Ok(envelope) =
                                    serde_json::from_str::<EventEnvelope>(&raw)
                                {
                                    state.heartbeat.reset();
                                    let message =
                                        format_sse(envelope.event_type.as_str(), &envelope.data);
                                    return Some((message, state));
                                }
                            }
                            None => state.broker_done = true,
                        }
                    }
                    _ = state.heartbeat.tick() => {
                        state.hub.touch(state.job_id, state.sub_id);
                        let data = json!({"timestamp": chrono::Utc::now().to_rfc3339()});
                        return Some((format_sse("heartbeat", &data), state));
                    }
                }
            }
        });

        Ok(stream::once(async move { first }).chain(rest))
    }

    /// Spawn the background sweeper that evicts stale subscriptions
    pub fn spawn_sweeper(hub: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let removed = hub.sweep(STALE_AFTER);
                if removed > 0 {
                    info!(removed, "cleaned up stale SSE connections");
                }
            }
        })
    }
}

struct SubscriptionState {
    hub: Arc<SseHub>,
    job_id: Uuid,
    sub_id: u64,
    receiver: mpsc::Receiver<String>,
    broker_events: MessageStream,
    broker_done: bool,
    heartbeat: tokio::time::Interval,
}

impl Drop for SubscriptionState {
    fn drop(&mut self) {
        self.hub.remove(self.job_id, self.sub_id);
    }
}

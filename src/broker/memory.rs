//! In-memory broker backend
//!
//! Single-process stand-in for the shared broker, used by local development
//! and the integration tests. Implements the same contract as the Redis
//! backend, including TTLs, blocking pops, and pub/sub fan-out.

use super::{CacheBroker, MessageStream};
use crate::error::PipelineResult;
use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Notify};
use tokio::time::Instant;
use tokio_stream::wrappers::BroadcastStream;

#[derive(Default)]
struct State {
    kv: HashMap<String, (String, Option<Instant>)>,
    zsets: HashMap<String, Vec<(String, f64)>>,
    lists: HashMap<String, VecDeque<String>>,
    sets: HashMap<String, HashSet<String>>,
    channels: HashMap<String, broadcast::Sender<String>>,
}

/// In-memory implementation of the cache/broker gateway
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<State>>,
    list_signal: Arc<Notify>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn live_value(entry: &(String, Option<Instant>)) -> Option<String> {
        match entry.1 {
            Some(expiry) if Instant::now() >= expiry => None,
            _ => Some(entry.0.clone()),
        }
    }

    fn sender_for(&self, channel: &str) -> broadcast::Sender<String> {
        let mut state = self.state.lock();
        state
            .channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(64).0)
            .clone()
    }
}

#[async_trait]
impl CacheBroker for MemoryBroker {
    async fn get(&self, key: &str) -> PipelineResult<Option<String>> {
        let mut state = self.state.lock();
        match state.kv.get(key) {
            Some(entry) => match Self::live_value(entry) {
                Some(value) => Ok(Some(value)),
                None => {
                    state.kv.remove(key);
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<u64>) -> PipelineResult<()> {
        let expiry = ttl.map(|secs| Instant::now() + Duration::from_secs(secs));
        self.state
            .lock()
            .kv
            .insert(key.to_string(), (value.to_string(), expiry));
        Ok(())
    }

    async fn delete(&self, key: &str) -> PipelineResult<bool> {
        Ok(self.state.lock().kv.remove(key).is_some())
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> PipelineResult<()> {
        let mut state = self.state.lock();
        let zset = state.zsets.entry(key.to_string()).or_default();
        zset.retain(|(m, _)| m != member);
        zset.push((member.to_string(), score));
        zset.sort_by(|a, b| a.1.total_cmp(&b.1));
        Ok(())
    }

    async fn zcard(&self, key: &str) -> PipelineResult<u64> {
        Ok(self
            .state
            .lock()
            .zsets
            .get(key)
            .map(|z| z.len() as u64)
            .unwrap_or(0))
    }

    async fn zremrangebyscore(&self, key: &str, max_score: f64) -> PipelineResult<()> {
        if let Some(zset) = self.state.lock().zsets.get_mut(key) {
            zset.retain(|(_, score)| *score > max_score);
        }
        Ok(())
    }

    async fn zrange_oldest(&self, key: &str) -> PipelineResult<Option<(String, f64)>> {
        Ok(self
            .state
            .lock()
            .zsets
            .get(key)
            .and_then(|z| z.first().cloned()))
    }

    async fn expire(&self, key: &str, ttl: u64) -> PipelineResult<()> {
        let expiry = Instant::now() + Duration::from_secs(ttl);
        if let Some(entry) = self.state.lock().kv.get_mut(key) {
            entry.1 = Some(expiry);
        }
        Ok(())
    }

    async fn lpush(&self, key: &str, value: &str) -> PipelineResult<()> {
        self.state
            .lock()
            .lists
            .entry(key.to_string())
            .or_default()
            .push_front(value.to_string());
        self.list_signal.notify_waiters();
        Ok(())
    }

    async fn brpop(&self, key: &str, timeout_secs: u64) -> PipelineResult<Option<String>> {
        let deadline = Instant::now() + Duration::from_secs(timeout_secs);
        loop {
            let notified = self.list_signal.notified();
            if let Some(value) = self
                .state
                .lock()
                .lists
                .get_mut(key)
                .and_then(|list| list.pop_back())
            {
                return Ok(Some(value));
            }
            let remaining = deadline.duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep(remaining) => return Ok(None),
            }
        }
    }

    async fn llen(&self, key: &str) -> PipelineResult<u64> {
        Ok(self
            .state
            .lock()
            .lists
            .get(key)
            .map(|l| l.len() as u64)
            .unwrap_or(0))
    }

    async fn sadd(&self, key: &str, member: &str) -> PipelineResult<()> {
        self.state
            .lock()
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn srem(&self, key: &str, member: &str) -> PipelineResult<()> {
        if let Some(set) = self.state.lock().sets.get_mut(key) {
            set.remove(member);
        }
        Ok(())
    }

    async fn publish(&self, channel: &str, payload: &str) -> PipelineResult<()> {
        // Send fails only when nobody is subscribed; events are fire-and-forget.
        let _ = self.sender_for(channel).send(payload.to_string());
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> PipelineResult<MessageStream> {
        let receiver = self.sender_for(channel).subscribe();
        let stream = BroadcastStream::new(receiver).filter_map(|msg| async move { msg.ok() });
        Ok(stream.boxed())
    }

    async fn ping(&self) -> PipelineResult<()> {
        Ok(())
    }
}

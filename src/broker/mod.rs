//! Cache/broker gateway
//!
//! Typed operations over the shared KV + pub/sub broker. All keys are
//! namespaced with the configured prefix. Errors surface as retryable unless
//! they are decode errors.

mod memory;
mod redis_broker;

pub use memory::MemoryBroker;
pub use redis_broker::RedisBroker;

use crate::error::PipelineResult;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Stream of raw message payloads from a subscribed channel.
///
/// Dropping the stream cancels the subscription.
pub type MessageStream = BoxStream<'static, String>;

/// Typed operations over the shared KV + pub/sub broker
#[async_trait]
pub trait CacheBroker: Send + Sync {
    /// Get a string value, `None` if absent or expired
    async fn get(&self, key: &str) -> PipelineResult<Option<String>>;

    /// Set a string value with an optional TTL in seconds
    async fn set(&self, key: &str, value: &str, ttl: Option<u64>) -> PipelineResult<()>;

    /// Delete a key, returning whether it existed
    async fn delete(&self, key: &str) -> PipelineResult<bool>;

    /// Add a member with a score to a sorted set
    async fn zadd(&self, key: &str, member: &str, score: f64) -> PipelineResult<()>;

    /// Cardinality of a sorted set
    async fn zcard(&self, key: &str) -> PipelineResult<u64>;

    /// Remove sorted-set members with score in `[0, max_score]`
    async fn zremrangebyscore(&self, key: &str, max_score: f64) -> PipelineResult<()>;

    /// Lowest-scored member of a sorted set, with its score
    async fn zrange_oldest(&self, key: &str) -> PipelineResult<Option<(String, f64)>>;

    /// Refresh a key's TTL
    async fn expire(&self, key: &str, ttl: u64) -> PipelineResult<()>;

    /// Push a value onto the head of a list
    async fn lpush(&self, key: &str, value: &str) -> PipelineResult<()>;

    /// Blocking pop from the tail of a list; `None` on timeout
    async fn brpop(&self, key: &str, timeout_secs: u64) -> PipelineResult<Option<String>>;

    /// Length of a list
    async fn llen(&self, key: &str) -> PipelineResult<u64>;

    /// Add a member to a set
    async fn sadd(&self, key: &str, member: &str) -> PipelineResult<()>;

    /// Remove a member from a set
    async fn srem(&self, key: &str, member: &str) -> PipelineResult<()>;

    /// Publish a payload to a channel
    async fn publish(&self, channel: &str, payload: &str) -> PipelineResult<()>;

    /// Subscribe to a channel, returning a cancellable message stream
    async fn subscribe(&self, channel: &str) -> PipelineResult<MessageStream>;

    /// Health probe (PING)
    async fn ping(&self) -> PipelineResult<()>;
}

/// Broker key catalog.
///
/// Keys are built unprefixed; implementations apply the configured namespace.
pub mod keys {
    use uuid::Uuid;

    pub const QUEUE_NAME: &str = "video_generation";

    pub fn jwt_valid(token_hash: &str) -> String {
        format!("jwt_valid:{token_hash}")
    }

    pub fn job_status(job_id: Uuid) -> String {
        format!("job_status:{job_id}")
    }

    pub fn job_cancel(job_id: Uuid) -> String {
        format!("job_cancel:{job_id}")
    }

    pub fn rate(user_id: Uuid) -> String {
        format!("rate:{user_id}")
    }

    pub fn queue_list() -> String {
        format!("{QUEUE_NAME}:queue")
    }

    pub fn processing_set() -> String {
        format!("{QUEUE_NAME}:processing")
    }

    pub fn job_payload(job_id: Uuid) -> String {
        format!("{QUEUE_NAME}:job:{job_id}")
    }

    pub fn audio_cache(file_hash: &str) -> String {
        format!("audio_cache:{file_hash}")
    }

    pub fn job_events(job_id: Uuid) -> String {
        format!("job_events:{job_id}")
    }
}

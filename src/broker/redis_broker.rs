//! Redis implementation of the cache/broker gateway

use super::{CacheBroker, MessageStream};
use crate::error::{PipelineError, PipelineResult};
use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

/// Async Redis broker with a managed multiplexed connection.
///
/// Pub/sub subscriptions open a dedicated connection each, since subscribe
/// mode takes over the connection for its lifetime.
#[derive(Clone)]
pub struct RedisBroker {
    manager: ConnectionManager,
    client: redis::Client,
    prefix: String,
}

impl RedisBroker {
    /// Connect to the broker at `url`, namespacing all keys with `prefix`
    pub async fn connect(url: &str, prefix: &str) -> PipelineResult<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| PipelineError::Config(format!("invalid REDIS_URL: {e}")))?;
        let manager = ConnectionManager::new(client.clone())
            .await
            .map_err(|e| PipelineError::Config(format!("failed to connect to broker: {e}")))?;
        Ok(Self {
            manager,
            client,
            prefix: prefix.to_string(),
        })
    }

    fn prefixed(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    fn conn(&self) -> ConnectionManager {
        self.manager.clone()
    }
}

#[async_trait]
impl CacheBroker for RedisBroker {
    async fn get(&self, key: &str) -> PipelineResult<Option<String>> {
        let value: Option<String> = self.conn().get(self.prefixed(key)).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<u64>) -> PipelineResult<()> {
        let key = self.prefixed(key);
        let mut cmd = redis::cmd("SET");
        cmd.arg(&key).arg(value);
        if let Some(secs) = ttl {
            cmd.arg("EX").arg(secs);
        }
        let _: () = cmd.query_async(&mut self.conn()).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> PipelineResult<bool> {
        let removed: u64 = self.conn().del(self.prefixed(key)).await?;
        Ok(removed > 0)
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> PipelineResult<()> {
        let _: () = self.conn().zadd(self.prefixed(key), member, score).await?;
        Ok(())
    }

    async fn zcard(&self, key: &str) -> PipelineResult<u64> {
        let count: u64 = self.conn().zcard(self.prefixed(key)).await?;
        Ok(count)
    }

    async fn zremrangebyscore(&self, key: &str, max_score: f64) -> PipelineResult<()> {
        let _: () = redis::cmd("ZREMRANGEBYSCORE")
            .arg(self.prefixed(key))
            .arg(0f64)
            .arg(max_score)
            .query_async(&mut self.conn())
            .await?;
        Ok(())
    }

    async fn zrange_oldest(&self, key: &str) -> PipelineResult<Option<(String, f64)>> {
        let entries: Vec<(String, f64)> = redis::cmd("ZRANGE")
            .arg(self.prefixed(key))
            .arg(0)
            .arg(0)
            .arg("WITHSCORES")
            .query_async(&mut self.conn())
            .await?;
        Ok(entries.into_iter().next())
    }

    async fn expire(&self, key: &str, ttl: u64) -> PipelineResult<()> {
        let _: () = redis::cmd("EXPIRE")
            .arg(self.prefixed(key))
            .arg(ttl)
            .query_async(&mut self.conn())
            .await?;
        Ok(())
    }

    async fn lpush(&self, key: &str, value: &str) -> PipelineResult<()> {
        let _: () = self.conn().lpush(self.prefixed(key), value).await?;
        Ok(())
    }

    async fn brpop(&self, key: &str, timeout_secs: u64) -> PipelineResult<Option<String>> {
        let popped: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(self.prefixed(key))
            .arg(timeout_secs)
            .query_async(&mut self.conn())
            .await?;
        Ok(popped.map(|(_, value)| value))
    }

    async fn llen(&self, key: &str) -> PipelineResult<u64> {
        let len: u64 = self.conn().llen(self.prefixed(key)).await?;
        Ok(len)
    }

    async fn sadd(&self, key: &str, member: &str) -> PipelineResult<()> {
        let _: () = self.conn().sadd(self.prefixed(key), member).await?;
        Ok(())
    }

    async fn srem(&self, key: &str, member: &str) -> PipelineResult<()> {
        let _: () = self.conn().srem(self.prefixed(key), member).await?;
        Ok(())
    }

    async fn publish(&self, channel: &str, payload: &str) -> PipelineResult<()> {
        let _: () = self.conn().publish(self.prefixed(channel), payload).await?;
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> PipelineResult<MessageStream> {
        let conn = self.client.get_async_connection().await?;
        let mut pubsub = conn.into_pubsub();
        pubsub.subscribe(self.prefixed(channel)).await?;
        let stream = pubsub
            .into_on_message()
            .filter_map(|msg| async move { msg.get_payload::<String>().ok() });
        Ok(stream.boxed())
    }

    async fn ping(&self) -> PipelineResult<()> {
        let _: String = redis::cmd("PING").query_async(&mut self.conn()).await?;
        Ok(())
    }
}

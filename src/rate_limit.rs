//! Rate limiting
//!
//! Per-user sliding-window quota over broker sorted sets: five admissions
//! per rolling hour. The window steps are not one atomic transaction;
//! slightly over-admitting under broker contention is acceptable.

use crate::broker::{keys, CacheBroker};
use crate::config::RateLimitPolicy;
use crate::error::{PipelineError, PipelineResult};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

const WINDOW_SECS: u64 = 3600;
const MAX_ADMISSIONS: u64 = 5;

/// Sliding-window rate limiter with a configurable broker-failure policy
#[derive(Clone)]
pub struct RateLimiter {
    broker: Arc<dyn CacheBroker>,
    policy: RateLimitPolicy,
}

impl RateLimiter {
    pub fn new(broker: Arc<dyn CacheBroker>, policy: RateLimitPolicy) -> Self {
        Self { broker, policy }
    }

    /// Admit or reject one request for `user_id`.
    ///
    /// On success the admission is recorded in the window. If the broker is
    /// unreachable the configured failure policy applies.
    pub async fn check(&self, user_id: Uuid) -> PipelineResult<()> {
        let now = chrono::Utc::now().timestamp() as u64;
        match self.check_window(user_id, now).await {
            Ok(()) => Ok(()),
            Err(err @ PipelineError::RateLimited { .. }) => Err(err),
            Err(err) => match self.policy {
                RateLimitPolicy::FailOpen => {
                    warn!(
                        user_id = %user_id,
                        error = %err,
                        "rate limiter unavailable, admitting (fail-open)"
                    );
                    Ok(())
                }
                RateLimitPolicy::FailClosed => {
                    warn!(
                        user_id = %user_id,
                        error = %err,
                        "rate limiter unavailable, rejecting (fail-closed)"
                    );
                    Err(PipelineError::RateLimited { retry_after: 60 })
                }
            },
        }
    }

    async fn check_window(&self, user_id: Uuid, now: u64) -> PipelineResult<()> {
        let key = keys::rate(user_id);
        let window_start = now.saturating_sub(WINDOW_SECS);

        self.broker
            .zremrangebyscore(&key, window_start as f64)
            .await?;

        let count = self.broker.zcard(&key).await?;
        if count >= MAX_ADMISSIONS {
            let retry_after = match self.broker.zrange_oldest(&key).await? {
                Some((_, oldest_score)) => {
                    WINDOW_SECS.saturating_sub(now.saturating_sub(oldest_score as u64))
                }
                None => WINDOW_SECS,
            };
            warn!(user_id = %user_id, count, retry_after, "rate limit exceeded");
            return Err(PipelineError::RateLimited { retry_after });
        }

        self.broker
            .zadd(&key, &now.to_string(), now as f64)
            .await?;
        self.broker.expire(&key, WINDOW_SECS).await?;

        debug!(user_id = %user_id, count = count + 1, "rate limit check passed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{MemoryBroker, MessageStream};
    use async_trait::async_trait;

    /// Broker stub whose every operation fails as retryable
    struct DownBroker;

    macro_rules! down {
        () => {
            Err(PipelineError::Retryable("broker down".into()))
        };
    }

    #[async_trait]
    impl CacheBroker for DownBroker {
        async fn get(&self, _: &str) -> PipelineResult<Option<String>> {
            down!()
        }
        async fn set(&self, _: &str, _: &str, _: Option<u64>) -> PipelineResult<()> {
            down!()
        }
        async fn delete(&self, _: &str) -> PipelineResult<bool> {
            down!()
        }
        async fn zadd(&self, _: &str, _: &str, _: f64) -> PipelineResult<()> {
            down!()
        }
        async fn zcard(&self, _: &str) -> PipelineResult<u64> {
            down!()
        }
        async fn zremrangebyscore(&self, _: &str, _: f64) -> PipelineResult<()> {
            down!()
        }
        async fn zrange_oldest(&self, _: &str) -> PipelineResult<Option<(String, f64)>> {
            down!()
        }
        async fn expire(&self, _: &str, _: u64) -> PipelineResult<()> {
            down!()
        }
        async fn lpush(&self, _: &str, _: &str) -> PipelineResult<()> {
            down!()
        }
        async fn brpop(&self, _: &str, _: u64) -> PipelineResult<Option<String>> {
            down!()
        }
        async fn llen(&self, _: &str) -> PipelineResult<u64> {
            down!()
        }
        async fn sadd(&self, _: &str, _: &str) -> PipelineResult<()> {
            down!()
        }
        async fn srem(&self, _: &str, _: &str) -> PipelineResult<()> {
            down!()
        }
        async fn publish(&self, _: &str, _: &str) -> PipelineResult<()> {
            down!()
        }
        async fn subscribe(&self, _: &str) -> PipelineResult<MessageStream> {
            down!()
        }
        async fn ping(&self) -> PipelineResult<()> {
            down!()
        }
    }

    #[tokio::test]
    async fn test_sixth_admission_rejected_with_retry_after() {
        let limiter = RateLimiter::new(Arc::new(MemoryBroker::new()), RateLimitPolicy::FailOpen);
        let user = Uuid::new_v4();

        for _ in 0..5 {
            limiter.check(user).await.unwrap();
        }

        match limiter.check(user).await {
            Err(PipelineError::RateLimited { retry_after }) => {
                // The oldest entry was recorded moments ago
                assert!(retry_after > 3590 && retry_after <= 3600);
            }
            other => panic!("expected rate limit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_expired_entries_free_the_window() {
        let broker = Arc::new(MemoryBroker::new());
        let limiter = RateLimiter::new(broker.clone(), RateLimitPolicy::FailOpen);
        let user = Uuid::new_v4();
        let key = keys::rate(user);

        // Five admissions just outside the window
        let stale = (chrono::Utc::now().timestamp() as u64) - WINDOW_SECS - 10;
        for i in 0..5u64 {
            let score = (stale + i) as f64;
            broker.zadd(&key, &(stale + i).to_string(), score).await.unwrap();
        }

        limiter.check(user).await.unwrap();
        assert_eq!(broker.zcard(&key).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_users_have_independent_windows() {
        let limiter = RateLimiter::new(Arc::new(MemoryBroker::new()), RateLimitPolicy::FailOpen);
        let first = Uuid::new_v4();
        for _ in 0..5 {
            limiter.check(first).await.unwrap();
        }
        assert!(limiter.check(first).await.is_err());
        assert!(limiter.check(Uuid::new_v4()).await.is_ok());
    }

    #[tokio::test]
    async fn test_fail_open_admits_when_broker_down() {
        let limiter = RateLimiter::new(Arc::new(DownBroker), RateLimitPolicy::FailOpen);
        assert!(limiter.check(Uuid::new_v4()).await.is_ok());
    }

    #[tokio::test]
    async fn test_fail_closed_rejects_when_broker_down() {
        let limiter = RateLimiter::new(Arc::new(DownBroker), RateLimitPolicy::FailClosed);
        match limiter.check(Uuid::new_v4()).await {
            Err(PipelineError::RateLimited { retry_after }) => assert_eq!(retry_after, 60),
            other => panic!("expected rate limit, got {other:?}"),
        }
    }
}

//! Shared gateway state
//!
//! One owning structure passed by reference to every handler.

use crate::auth::TokenValidator;
use crate::broker::CacheBroker;
use crate::config::Settings;
use crate::events::EventBus;
use crate::pipeline::ObjectStore;
use crate::queue::JobQueue;
use crate::rate_limit::RateLimiter;
use crate::sse::SseHub;
use crate::store::JobStore;
use std::sync::Arc;

/// Ingress dependencies, assembled once at boot
pub struct AppState {
    pub settings: Settings,
    pub broker: Arc<dyn CacheBroker>,
    pub store: Arc<dyn JobStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub validator: TokenValidator,
    pub limiter: RateLimiter,
    pub queue: JobQueue,
    pub events: EventBus,
    pub hub: Arc<SseHub>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    /// Wire the full state from its backends
    pub fn new(
        settings: Settings,
        broker: Arc<dyn CacheBroker>,
        store: Arc<dyn JobStore>,
        objects: Arc<dyn ObjectStore>,
    ) -> SharedState {
        let validator = TokenValidator::new(broker.clone(), &settings.jwt_secret);
        let limiter = RateLimiter::new(broker.clone(), settings.rate_limit_policy);
        let queue = JobQueue::new(broker.clone());
        let events = EventBus::new(broker.clone());
        Arc::new(AppState {
            settings,
            broker,
            store,
            objects,
            validator,
            limiter,
            queue,
            events,
            hub: Arc::new(SseHub::new()),
        })
    }
}

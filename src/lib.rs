//! VideoGen control plane
//!
//! Admission, queueing, orchestration, progress fan-out, cost enforcement,
//! and authentication for the asynchronous media-generation service. The
//! media stages themselves, the object store, the relational store, the
//! broker, and the identity provider are external collaborators reached
//! through the typed gateways in this crate.

pub mod api;
pub mod auth;
pub mod broker;
pub mod config;
pub mod cost;
pub mod error;
pub mod events;
pub mod models;
pub mod pipeline;
pub mod queue;
pub mod rate_limit;
pub mod sse;
pub mod storage;
pub mod store;
pub mod validation;
pub mod worker;

pub use error::{PipelineError, PipelineResult};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise the configured log level applies.
pub fn init_tracing(directive: &str) {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive.to_string()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

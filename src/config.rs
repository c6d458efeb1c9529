//! Configuration management
//!
//! Centralized environment-variable settings with boot-time validation.
//! Every value the control plane needs is resolved once at startup; invalid
//! configuration fails the process before any listener binds.

use crate::error::{PipelineError, PipelineResult};
use serde::Deserialize;

/// Deployment environment, selects budget limits and cost rates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    /// Production and staging share billing behavior
    pub fn is_billed(&self) -> bool {
        matches!(self, Environment::Production | Environment::Staging)
    }
}

/// Behavior when the rate limiter cannot reach the broker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitPolicy {
    /// Admit the request with a warning
    FailOpen,
    /// Reject the request with retry_after = 60
    FailClosed,
}

/// Application settings loaded from environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Relational store base URL
    pub store_url: String,
    /// Relational store service key
    pub store_service_key: String,
    /// Broker URL (redis:// or rediss://)
    pub redis_url: String,
    /// Shared secret for bearer verification (HS256)
    pub jwt_secret: String,
    /// Frontend origin allowed by CORS
    pub frontend_url: String,
    #[serde(default = "defaults::environment")]
    pub environment: Environment,
    /// tracing filter directive, e.g. "info" or "videogen=debug"
    #[serde(default = "defaults::log_level")]
    pub log_level: String,
    #[serde(default = "defaults::rate_limit_policy")]
    pub rate_limit_policy: RateLimitPolicy,
    /// Namespace prefix applied to every broker key
    #[serde(default = "defaults::cache_namespace")]
    pub cache_namespace: String,
    /// Gateway bind address
    #[serde(default = "defaults::bind_addr")]
    pub bind_addr: String,
    /// Max concurrent pipeline executions per worker process
    #[serde(default = "defaults::worker_concurrency")]
    pub worker_concurrency: usize,
}

mod defaults {
    use super::{Environment, RateLimitPolicy};

    pub fn environment() -> Environment {
        Environment::Development
    }

    pub fn log_level() -> String {
        "info".to_string()
    }

    pub fn rate_limit_policy() -> RateLimitPolicy {
        RateLimitPolicy::FailOpen
    }

    pub fn cache_namespace() -> String {
        "videogen:cache:".to_string()
    }

    pub fn bind_addr() -> String {
        "0.0.0.0:8000".to_string()
    }

    pub fn worker_concurrency() -> usize {
        3
    }
}

impl Settings {
    /// Load settings from the process environment
    pub fn from_env() -> PipelineResult<Self> {
        let loaded = config::Config::builder()
            .add_source(config::Environment::default().try_parsing(true))
            .build()
            .map_err(|e| PipelineError::Config(format!("failed to read environment: {e}")))?;

        let settings: Settings = loaded
            .try_deserialize()
            .map_err(|e| PipelineError::Config(format!("failed to load configuration: {e}")))?;

        settings.validate()?;
        Ok(settings)
    }

    /// Validate field formats; called once at boot
    pub fn validate(&self) -> PipelineResult<()> {
        require_http_url("STORE_URL", &self.store_url)?;
        require_http_url("FRONTEND_URL", &self.frontend_url)?;

        if !self.redis_url.starts_with("redis://") && !self.redis_url.starts_with("rediss://") {
            return Err(PipelineError::Config(
                "REDIS_URL must start with redis:// or rediss://".to_string(),
            ));
        }
        if self.store_service_key.len() < 50 {
            return Err(PipelineError::Config(
                "STORE_SERVICE_KEY appears to be invalid".to_string(),
            ));
        }
        if self.jwt_secret.len() < 32 {
            return Err(PipelineError::Config(
                "JWT_SECRET must be at least 32 characters".to_string(),
            ));
        }
        if self.worker_concurrency == 0 {
            return Err(PipelineError::Config(
                "WORKER_CONCURRENCY must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn require_http_url(name: &str, value: &str) -> PipelineResult<()> {
    if value.is_empty() {
        return Err(PipelineError::Config(format!("{name} is required")));
    }
    if !value.starts_with("http://") && !value.starts_with("https://") {
        return Err(PipelineError::Config(format!(
            "{name} must be a valid HTTP/HTTPS URL"
        )));
    }
    Ok(())
}

//! Error types for the control plane
//!
//! One taxonomy serves the whole pipeline: components classify at the lowest
//! layer that knows the semantics, and the ingress boundary translates to
//! HTTP envelopes.

use thiserror::Error;

/// Result type for control-plane operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Comprehensive error types for the control plane
#[derive(Error, Debug)]
pub enum PipelineError {
    /// User-visible input error, non-retryable
    #[error("Validation error: {0}")]
    Validation(String),

    /// Bearer token missing, malformed, expired, or unverifiable
    #[error("Invalid or expired token")]
    AuthInvalidToken,

    /// Token verified but carries no subject claim
    #[error("Invalid token: missing user_id")]
    AuthMissingSubject,

    /// Authenticated but not authorized for the resource
    #[error("Resource does not belong to user")]
    Ownership,

    /// Resource not found
    #[error("{0} not found")]
    NotFound(String),

    /// Resource existed but is no longer available
    #[error("{0} no longer available")]
    Gone(String),

    /// Request conflicts with current resource state
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Per-user admission quota exhausted
    #[error("Rate limit exceeded: 5 jobs per hour")]
    RateLimited {
        /// Seconds until the oldest window entry expires
        retry_after: u64,
    },

    /// Cost exceeds the environment budget limit
    #[error("{0}")]
    BudgetExceeded(String),

    /// Transient failure; the caller may retry
    #[error("Retryable error: {0}")]
    Retryable(String),

    /// Non-retryable internal pipeline failure
    #[error("{0}")]
    Pipeline(String),

    /// Boot-time configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    /// Stable machine-readable code for the error envelope
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::Validation(_) => "VALIDATION_ERROR",
            PipelineError::AuthInvalidToken => "AUTH_INVALID_TOKEN",
            PipelineError::AuthMissingSubject => "AUTH_MISSING_SUBJECT",
            PipelineError::Ownership => "FORBIDDEN",
            PipelineError::NotFound(_) => "NOT_FOUND",
            PipelineError::Gone(_) => "GONE",
            PipelineError::Conflict(_) => "CONFLICT",
            PipelineError::RateLimited { .. } => "RATE_LIMIT_EXCEEDED",
            PipelineError::BudgetExceeded(_) => "BUDGET_EXCEEDED",
            PipelineError::Retryable(_) => "RETRYABLE_ERROR",
            PipelineError::Pipeline(_) => "MODULE_FAILURE",
            PipelineError::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Whether the caller may retry the failed operation
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::Retryable(_) | PipelineError::RateLimited { .. }
        )
    }
}

impl From<redis::RedisError> for PipelineError {
    fn from(err: redis::RedisError) -> Self {
        PipelineError::Retryable(format!("broker error: {err}"))
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(err: reqwest::Error) -> Self {
        PipelineError::Retryable(format!("store request failed: {err}"))
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        // Decode failures are not transient; retrying replays the same bytes.
        PipelineError::Pipeline(format!("JSON decode failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(
            PipelineError::Validation("x".into()).code(),
            "VALIDATION_ERROR"
        );
        assert_eq!(
            PipelineError::BudgetExceeded("x".into()).code(),
            "BUDGET_EXCEEDED"
        );
        assert_eq!(
            PipelineError::RateLimited { retry_after: 10 }.code(),
            "RATE_LIMIT_EXCEEDED"
        );
    }

    #[test]
    fn test_retryability() {
        assert!(PipelineError::Retryable("x".into()).is_retryable());
        assert!(PipelineError::RateLimited { retry_after: 1 }.is_retryable());
        assert!(!PipelineError::Pipeline("x".into()).is_retryable());
        assert!(!PipelineError::BudgetExceeded("x".into()).is_retryable());
    }

    #[test]
    fn test_auth_variants_are_distinct() {
        assert_ne!(
            PipelineError::AuthInvalidToken.code(),
            PipelineError::AuthMissingSubject.code()
        );
    }
}

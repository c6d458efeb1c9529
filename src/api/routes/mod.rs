//! Route handlers

pub mod download;
pub mod health;
pub mod jobs;
pub mod stream;
pub mod upload;

use crate::api::state::SharedState;
use crate::auth::AuthContext;
use crate::error::{PipelineError, PipelineResult};
use crate::models::Job;
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};
use uuid::Uuid;

/// Root endpoint
pub async fn root() -> Json<Value> {
    Json(json!({
        "message": "VideoGen API Gateway",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Extract the bearer token from the `Authorization` header
pub fn bearer_token(headers: &HeaderMap) -> PipelineResult<String> {
    headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string)
        .ok_or(PipelineError::AuthInvalidToken)
}

/// Authenticate the caller from the request headers
pub async fn authenticate(state: &SharedState, headers: &HeaderMap) -> PipelineResult<AuthContext> {
    let token = bearer_token(headers)?;
    state.validator.validate(&token).await
}

/// Load a job and verify the caller owns it.
///
/// Ownership is checked before any cache access and is authoritative.
pub async fn verify_job_ownership(
    state: &SharedState,
    job_id: Uuid,
    user_id: Uuid,
) -> PipelineResult<Job> {
    let job = state
        .store
        .get_job(job_id)
        .await?
        .ok_or_else(|| PipelineError::NotFound("Job".to_string()))?;
    if job.user_id != user_id {
        return Err(PipelineError::Ownership);
    }
    Ok(job)
}

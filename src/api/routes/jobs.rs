//! Job status, listing, and cancellation endpoints

use crate::api::error::{ApiError, ApiResultExt};
use crate::api::middleware::RequestId;
use crate::api::routes::{authenticate, verify_job_ownership};
use crate::api::state::SharedState;
use crate::broker::keys;
use crate::error::{PipelineError, PipelineResult};
use crate::models::{JobStatus, JobUpdate};
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

const STATUS_CACHE_TTL_SECS: u64 = 30;
const CANCEL_MARKER_TTL_SECS: u64 = 900;

/// `GET /api/v1/jobs/{job_id}` — polling fallback; SSE is preferred
pub async fn get_job_status(
    State(state): State<SharedState>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    headers: HeaderMap,
    Path(job_id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let user = authenticate(&state, &headers).await.or_api(request_id)?;
    // Ownership first; the cache is consulted only afterwards
    let job = verify_job_ownership(&state, job_id, user.user_id)
        .await
        .or_api(request_id)?;

    let cache_key = keys::job_status(job_id);
    match state.broker.get(&cache_key).await {
        Ok(Some(cached)) => {
            if let Ok(value) = serde_json::from_str::<Value>(&cached) {
                return Ok(Json(value));
            }
        }
        Ok(None) => {}
        Err(e) => warn!(job_id = %job_id, error = %e, "failed to read job status cache"),
    }

    let value = serde_json::to_value(&job)
        .map_err(PipelineError::from)
        .or_api(request_id)?;
    if let Err(e) = state
        .broker
        .set(&cache_key, &value.to_string(), Some(STATUS_CACHE_TTL_SECS))
        .await
    {
        warn!(job_id = %job_id, error = %e, "failed to cache job status");
    }
    Ok(Json(value))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    status: Option<String>,
    limit: Option<u32>,
    offset: Option<u32>,
}

fn parse_list_params(params: &ListParams) -> PipelineResult<(Option<JobStatus>, u32, u32)> {
    let status = match params.status.as_deref() {
        Some(raw) => Some(raw.parse::<JobStatus>().map_err(|_| {
            PipelineError::Validation(
                "Invalid status filter. Must be one of: queued, processing, completed, failed"
                    .to_string(),
            )
        })?),
        None => None,
    };
    let limit = params.limit.unwrap_or(10);
    if !(1..=50).contains(&limit) {
        return Err(PipelineError::Validation(
            "limit must be between 1 and 50".to_string(),
        ));
    }
    Ok((status, limit, params.offset.unwrap_or(0)))
}

/// `GET /api/v1/jobs` — the caller's jobs, newest first
pub async fn list_jobs(
    State(state): State<SharedState>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Result<Json<Value>, ApiError> {
    let user = authenticate(&state, &headers).await.or_api(request_id)?;
    let (status, limit, offset) = parse_list_params(&params).or_api(request_id)?;

    let page = state
        .store
        .list_jobs(user.user_id, status, limit, offset)
        .await
        .or_api(request_id)?;

    Ok(Json(json!({
        "jobs": page.jobs,
        "total": page.total,
        "limit": limit,
        "offset": offset,
    })))
}

/// `POST /api/v1/jobs/{job_id}/cancel` — only from `queued` or `processing`
pub async fn cancel_job(
    State(state): State<SharedState>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    headers: HeaderMap,
    Path(job_id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let user = authenticate(&state, &headers).await.or_api(request_id)?;
    let job = verify_job_ownership(&state, job_id, user.user_id)
        .await
        .or_api(request_id)?;

    match job.status {
        JobStatus::Queued => {
            // Drop the payload key; the stale list entry is drained later by
            // a worker whose pre-check sees the terminal row.
            state.queue.remove(job_id).await.or_api(request_id)?;
        }
        JobStatus::Processing => {
            state
                .broker
                .set(&keys::job_cancel(job_id), "1", Some(CANCEL_MARKER_TTL_SECS))
                .await
                .or_api(request_id)?;
        }
        other => {
            return Err(ApiError::from_pipeline(
                PipelineError::Conflict(format!(
                    "Cannot cancel job with status: {}",
                    other.as_str()
                )),
                request_id,
            ));
        }
    }

    state
        .store
        .update_job(
            job_id,
            &JobUpdate {
                status: Some(JobStatus::Failed),
                error_message: Some("Job cancelled by user".to_string()),
                ..JobUpdate::touched()
            },
        )
        .await
        .or_api(request_id)?;

    if let Err(e) = state.broker.delete(&keys::job_status(job_id)).await {
        warn!(job_id = %job_id, error = %e, "failed to invalidate job status cache");
    }

    info!(
        request_id = %request_id,
        job_id = %job_id,
        previous_status = job.status.as_str(),
        "job cancelled"
    );

    Ok(Json(json!({
        "job_id": job_id,
        "status": "failed",
        "message": "Job cancelled by user",
    })))
}

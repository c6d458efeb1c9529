//! Download endpoint

use crate::api::error::{ApiError, ApiResultExt};
use crate::api::middleware::RequestId;
use crate::api::routes::{authenticate, verify_job_ownership};
use crate::api::state::SharedState;
use crate::error::PipelineError;
use crate::models::JobStatus;
use crate::storage::VIDEO_BUCKET;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::{Extension, Json};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

const SIGNED_URL_TTL_SECS: u64 = 3600;

/// `GET /api/v1/jobs/{job_id}/download` — one-hour signed URL to the artifact
pub async fn download_video(
    State(state): State<SharedState>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    headers: HeaderMap,
    Path(job_id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let user = authenticate(&state, &headers).await.or_api(request_id)?;
    let job = verify_job_ownership(&state, job_id, user.user_id)
        .await
        .or_api(request_id)?;

    if job.status != JobStatus::Completed {
        return Err(ApiError::from_pipeline(
            PipelineError::NotFound("Job not completed or video".to_string()),
            request_id,
        ));
    }
    if job.video_url.is_none() {
        return Err(ApiError::from_pipeline(
            PipelineError::Gone("Video file".to_string()),
            request_id,
        ));
    }

    let artifact_path = format!("{job_id}/final_video.mp4");
    let download_url = state
        .objects
        .signed_url(VIDEO_BUCKET, &artifact_path, SIGNED_URL_TTL_SECS)
        .await
        .or_api(request_id)?;

    info!(request_id = %request_id, job_id = %job_id, "signed URL generated");

    Ok(Json(json!({
        "download_url": download_url,
        "expires_in": SIGNED_URL_TTL_SECS,
        "filename": format!("music_video_{job_id}.mp4"),
    })))
}

//! Upload-and-admit endpoint

use crate::api::error::{ApiError, ApiResultExt};
use crate::api::middleware::RequestId;
use crate::api::routes::authenticate;
use crate::api::state::SharedState;
use crate::cost::{budget_limit, cost_estimate};
use crate::error::{PipelineError, PipelineResult};
use crate::models::{Job, JobStatus, QueuePayload};
use crate::storage::AUDIO_BUCKET;
use crate::validation::{probe_audio, validate_prompt};
use axum::extract::{Multipart, State};
use axum::http::{HeaderMap, StatusCode};
use axum::{Extension, Json};
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

struct UploadForm {
    filename: String,
    content_type: Option<String>,
    bytes: Vec<u8>,
    user_prompt: String,
}

async fn read_form(mut multipart: Multipart) -> PipelineResult<UploadForm> {
    let mut audio: Option<(String, Option<String>, Vec<u8>)> = None;
    let mut user_prompt: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| PipelineError::Validation(format!("Invalid multipart body: {e}")))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("audio_file") => {
                let filename = field
                    .file_name()
                    .unwrap_or("audio")
                    .to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| PipelineError::Validation(format!("Failed to read file: {e}")))?
                    .to_vec();
                audio = Some((filename, content_type, bytes));
            }
            Some("user_prompt") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| PipelineError::Validation(format!("Failed to read prompt: {e}")))?;
                user_prompt = Some(text);
            }
            _ => {}
        }
    }

    let (filename, content_type, bytes) =
        audio.ok_or_else(|| PipelineError::Validation("File is required".to_string()))?;
    let user_prompt =
        user_prompt.ok_or_else(|| PipelineError::Validation("Prompt is required".to_string()))?;
    Ok(UploadForm {
        filename,
        content_type,
        bytes,
        user_prompt,
    })
}

/// `POST /api/v1/upload-audio` — validate, estimate, rate-limit, persist,
/// enqueue
pub async fn upload_audio(
    State(state): State<SharedState>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let user = authenticate(&state, &headers).await.or_api(request_id)?;
    let form = read_form(multipart).await.or_api(request_id)?;

    let info = probe_audio(&form.bytes).or_api(request_id)?;
    validate_prompt(&form.user_prompt).or_api(request_id)?;

    let environment = state.settings.environment;
    let duration_minutes = info.duration_secs / 60.0;
    let estimated_cost = cost_estimate(duration_minutes, environment);
    let limit = budget_limit(environment);
    if estimated_cost > limit {
        return Err(ApiError::from_pipeline(
            PipelineError::BudgetExceeded(format!(
                "Estimated cost (${estimated_cost}) exceeds ${limit} limit. \
                 Audio duration: {duration_minutes:.2} minutes"
            )),
            request_id,
        ));
    }

    state.limiter.check(user.user_id).await.or_api(request_id)?;

    let job_id = Uuid::new_v4();
    let storage_path = format!("{}/{}/{}", user.user_id, job_id, form.filename);
    let content_type = form
        .content_type
        .unwrap_or_else(|| info.format.content_type().to_string());
    let audio_url = state
        .objects
        .upload(AUDIO_BUCKET, &storage_path, form.bytes, &content_type)
        .await
        .or_api(request_id)?;

    let created_at = Utc::now();
    let job = Job {
        id: job_id,
        user_id: user.user_id,
        status: JobStatus::Queued,
        audio_url: audio_url.clone(),
        user_prompt: form.user_prompt.clone(),
        progress: 0,
        current_stage: None,
        estimated_cost,
        total_cost: Decimal::ZERO,
        video_url: None,
        error_message: None,
        created_at,
        updated_at: None,
        completed_at: None,
    };
    state.store.insert_job(&job).await.or_api(request_id)?;

    state
        .queue
        .enqueue(&QueuePayload {
            job_id,
            user_id: user.user_id,
            audio_url,
            user_prompt: form.user_prompt,
            created_at,
        })
        .await
        .or_api(request_id)?;

    info!(
        request_id = %request_id,
        job_id = %job_id,
        user_id = %user.user_id,
        estimated_cost = %estimated_cost,
        duration_minutes,
        "job created and enqueued"
    );

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "job_id": job_id,
            "status": "queued",
            "estimated_cost": estimated_cost,
            "created_at": created_at,
        })),
    ))
}

//! SSE stream endpoint

use crate::api::error::{ApiError, ApiResultExt};
use crate::api::middleware::RequestId;
use crate::api::routes::{bearer_token, verify_job_ownership};
use crate::api::state::SharedState;
use crate::sse;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::Response;
use axum::Extension;
use futures::StreamExt;
use serde::Deserialize;
use std::convert::Infallible;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct StreamParams {
    /// Alternative bearer: EventSource clients cannot set headers
    token: Option<String>,
}

/// `GET /api/v1/jobs/{job_id}/stream` — live progress as text/event-stream
pub async fn stream_progress(
    State(state): State<SharedState>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    headers: HeaderMap,
    Path(job_id): Path<Uuid>,
    Query(params): Query<StreamParams>,
) -> Result<Response, ApiError> {
    let token = match params.token {
        Some(token) => token,
        None => bearer_token(&headers).or_api(request_id)?,
    };
    let user = state.validator.validate(&token).await.or_api(request_id)?;
    verify_job_ownership(&state, job_id, user.user_id)
        .await
        .or_api(request_id)?;

    // Replay the job's current state as the first event
    let job = state.store.get_job(job_id).await.or_api(request_id)?;
    let initial = sse::initial_state(job.as_ref());

    let broker_events = state.events.subscribe(job_id).await.or_api(request_id)?;
    let stream = state
        .hub
        .clone()
        .subscribe(job_id, initial, broker_events)
        .map_err(|_| ApiError::max_connections(request_id))?;

    info!(request_id = %request_id, job_id = %job_id, "SSE stream opened");

    let body = Body::from_stream(stream.map(Ok::<_, Infallible>));
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header("X-Accel-Buffering", "no")
        .body(body)
        .map_err(|e| {
            ApiError::from_pipeline(
                crate::error::PipelineError::Pipeline(format!("failed to build response: {e}")),
                request_id,
            )
        })
}

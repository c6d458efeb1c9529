//! Ingress API
//!
//! Request surface of the control plane: admission, status, listing,
//! cancellation, live streaming, download, and health.

mod error;
mod middleware;
mod routes;
mod state;

pub use error::{ApiError, ApiResultExt};
pub use middleware::RequestId;
pub use state::{AppState, SharedState};

use crate::error::{PipelineError, PipelineResult};
use axum::extract::DefaultBodyLimit;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Uploads are capped at 10 MiB; leave multipart framing headroom
const BODY_LIMIT_BYTES: usize = 12 * 1024 * 1024;

/// Build the gateway router
pub fn router(state: SharedState) -> PipelineResult<Router> {
    let origin = HeaderValue::from_str(&state.settings.frontend_url)
        .map_err(|_| PipelineError::Config("FRONTEND_URL is not a valid origin".into()))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600));

    Ok(Router::new()
        .route("/", get(routes::root))
        .route("/api/v1/health", get(routes::health::health_check))
        .route("/api/v1/upload-audio", post(routes::upload::upload_audio))
        .route("/api/v1/jobs", get(routes::jobs::list_jobs))
        .route("/api/v1/jobs/:job_id", get(routes::jobs::get_job_status))
        .route("/api/v1/jobs/:job_id/cancel", post(routes::jobs::cancel_job))
        .route("/api/v1/jobs/:job_id/stream", get(routes::stream::stream_progress))
        .route(
            "/api/v1/jobs/:job_id/download",
            get(routes::download::download_video),
        )
        .layer(axum::middleware::from_fn(middleware::request_id))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .with_state(state))
}

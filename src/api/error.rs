//! HTTP error envelopes
//!
//! Handled errors leave the gateway as
//! `{error, code, retryable, request_id}`; rate-limit responses also carry
//! `Retry-After`.

use crate::error::PipelineError;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use uuid::Uuid;

/// A pipeline error bound to its request context
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: String,
    message: String,
    retryable: bool,
    retry_after: Option<u64>,
    request_id: Uuid,
}

impl ApiError {
    pub fn from_pipeline(err: PipelineError, request_id: Uuid) -> Self {
        let status = match &err {
            PipelineError::Validation(_) | PipelineError::Conflict(_) => StatusCode::BAD_REQUEST,
            PipelineError::AuthInvalidToken | PipelineError::AuthMissingSubject => {
                StatusCode::UNAUTHORIZED
            }
            PipelineError::Ownership => StatusCode::FORBIDDEN,
            PipelineError::NotFound(_) => StatusCode::NOT_FOUND,
            PipelineError::Gone(_) => StatusCode::GONE,
            PipelineError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            PipelineError::BudgetExceeded(_) => StatusCode::PAYMENT_REQUIRED,
            PipelineError::Retryable(_)
            | PipelineError::Pipeline(_)
            | PipelineError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let retry_after = match &err {
            PipelineError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        };
        Self {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
            retryable: err.is_retryable(),
            retry_after,
            request_id,
        }
    }

    /// Per-job SSE subscription cap reached
    pub fn max_connections(request_id: Uuid) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            code: "MAX_CONNECTIONS".to_string(),
            message: format!(
                "Maximum {} connections per job exceeded",
                crate::sse::MAX_CONNECTIONS_PER_JOB
            ),
            retryable: true,
            retry_after: None,
            request_id,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "code": self.code,
            "retryable": self.retryable,
            "request_id": self.request_id,
        }));
        let mut response = (self.status, body).into_response();
        if let Some(retry_after) = self.retry_after {
            if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
                response.headers_mut().insert("Retry-After", value);
            }
        }
        response
    }
}

/// Bind pipeline errors to the active request id
pub trait ApiResultExt<T> {
    fn or_api(self, request_id: Uuid) -> Result<T, ApiError>;
}

impl<T> ApiResultExt<T> for Result<T, PipelineError> {
    fn or_api(self, request_id: Uuid) -> Result<T, ApiError> {
        self.map_err(|err| ApiError::from_pipeline(err, request_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (PipelineError::Validation("x".into()), 400),
            (PipelineError::AuthInvalidToken, 401),
            (PipelineError::BudgetExceeded("x".into()), 402),
            (PipelineError::Ownership, 403),
            (PipelineError::NotFound("Job".into()), 404),
            (PipelineError::Gone("video".into()), 410),
            (PipelineError::RateLimited { retry_after: 9 }, 429),
            (PipelineError::Pipeline("x".into()), 500),
        ];
        for (err, expected) in cases {
            let api = ApiError::from_pipeline(err, Uuid::new_v4());
            assert_eq!(api.status.as_u16(), expected);
        }
    }

    #[test]
    fn test_rate_limit_carries_retry_after_header() {
        let api = ApiError::from_pipeline(
            PipelineError::RateLimited { retry_after: 3599 },
            Uuid::new_v4(),
        );
        let response = api.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get("Retry-After").unwrap(),
            &HeaderValue::from_static("3599")
        );
    }
}

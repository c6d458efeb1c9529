//! Ingress API tests over the in-memory backends

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use common::*;
use futures::StreamExt;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;
use videogen::api;
use videogen::broker::{keys, CacheBroker};
use videogen::config::Environment;
use videogen::models::{JobStatus, JobUpdate};
use videogen::pipeline::ObjectStore;
use videogen::storage::VIDEO_BUCKET;
use videogen::store::JobStore;

const BOUNDARY: &str = "videogen-test-boundary";

fn app(harness: &TestHarness) -> Router {
    api::router(harness.state.clone()).unwrap()
}

fn upload_request(token: &str, audio: &[u8], prompt: &str) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        b"Content-Disposition: form-data; name=\"audio_file\"; filename=\"song.wav\"\r\n",
    );
    body.extend_from_slice(b"Content-Type: audio/wav\r\n\r\n");
    body.extend_from_slice(audio);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Disposition: form-data; name=\"user_prompt\"\r\n\r\n");
    body.extend_from_slice(prompt.as_bytes());
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/api/v1/upload-audio")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

fn post(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_upload_happy_path_development() {
    let harness = harness(Environment::Development);
    let app = app(&harness);
    let user_id = Uuid::new_v4();
    let prompt = "a".repeat(80);

    let response = app
        .oneshot(upload_request(&token_for(user_id), &wav_bytes(60), &prompt))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert!(response.headers().contains_key("X-Request-ID"));

    let body = json_body(response).await;
    assert_eq!(body["status"], "queued");
    assert_eq!(body["estimated_cost"], 2.0);

    let job_id: Uuid = body["job_id"].as_str().unwrap().parse().unwrap();
    let job = harness.store.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Queued);
    assert_eq!(job.user_id, user_id);
    assert_eq!(job.progress, 0);

    // One queue entry and a crash-resume payload key
    assert_eq!(
        harness.broker.llen(&keys::queue_list()).await.unwrap(),
        1
    );
    assert!(harness
        .broker
        .get(&keys::job_payload(job_id))
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_upload_validation_failures() {
    let harness = harness(Environment::Development);
    let token = token_for(Uuid::new_v4());

    // Prompt too short
    let response = app(&harness)
        .oneshot(upload_request(&token, &wav_bytes(60), "too short"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert_eq!(body["retryable"], false);
    assert!(body["request_id"].is_string());

    // Not an audio file
    let response = app(&harness)
        .oneshot(upload_request(&token, b"plain text", &"a".repeat(80)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_upload_requires_valid_bearer() {
    let harness = harness(Environment::Development);

    let response = app(&harness)
        .oneshot(upload_request("not-a-jwt", &wav_bytes(60), &"a".repeat(80)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["code"], "AUTH_INVALID_TOKEN");
}

#[tokio::test]
async fn test_upload_rejects_over_budget_estimate() {
    let harness = harness(Environment::Development);

    // An hour of audio estimates far past the development budget
    let response = app(&harness)
        .oneshot(upload_request(
            &token_for(Uuid::new_v4()),
            &wav_bytes(3600),
            &"a".repeat(80),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    let body = json_body(response).await;
    assert_eq!(body["code"], "BUDGET_EXCEEDED");
}

#[tokio::test]
async fn test_rate_limit_exhaustion_returns_retry_after() {
    let harness = harness(Environment::Development);
    let token = token_for(Uuid::new_v4());
    let prompt = "a".repeat(80);

    for _ in 0..5 {
        let response = app(&harness)
            .oneshot(upload_request(&token, &wav_bytes(60), &prompt))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let response = app(&harness)
        .oneshot(upload_request(&token, &wav_bytes(60), &prompt))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let retry_after: u64 = response
        .headers()
        .get("Retry-After")
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after > 3590 && retry_after <= 3600);

    let body = json_body(response).await;
    assert_eq!(body["code"], "RATE_LIMIT_EXCEEDED");
    assert_eq!(body["retryable"], true);
}

#[tokio::test]
async fn test_job_status_enforces_ownership() {
    let harness = harness(Environment::Development);
    let owner = Uuid::new_v4();
    let job = seeded_job(&harness.store, owner, JobStatus::Processing).await;

    let response = app(&harness)
        .oneshot(get(&format!("/api/v1/jobs/{}", job.id), &token_for(owner)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["id"].as_str().unwrap(), job.id.to_string());

    // Another authenticated user is forbidden
    let response = app(&harness)
        .oneshot(get(
            &format!("/api/v1/jobs/{}", job.id),
            &token_for(Uuid::new_v4()),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Unknown job is a 404
    let response = app(&harness)
        .oneshot(get(
            &format!("/api/v1/jobs/{}", Uuid::new_v4()),
            &token_for(owner),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_jobs_paginates_and_validates_filter() {
    let harness = harness(Environment::Development);
    let owner = Uuid::new_v4();
    for _ in 0..3 {
        seeded_job(&harness.store, owner, JobStatus::Queued).await;
    }
    seeded_job(&harness.store, Uuid::new_v4(), JobStatus::Queued).await;

    let response = app(&harness)
        .oneshot(get("/api/v1/jobs?limit=2", &token_for(owner)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["total"], 3);
    assert_eq!(body["jobs"].as_array().unwrap().len(), 2);
    assert_eq!(body["limit"], 2);
    assert_eq!(body["offset"], 0);

    let response = app(&harness)
        .oneshot(get("/api/v1/jobs?status=done", &token_for(owner)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app(&harness)
        .oneshot(get("/api/v1/jobs?limit=51", &token_for(owner)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cancel_queued_then_double_cancel() {
    let harness = harness(Environment::Development);
    let owner = Uuid::new_v4();
    let job = seeded_job(&harness.store, owner, JobStatus::Queued).await;

    let response = app(&harness)
        .oneshot(post(
            &format!("/api/v1/jobs/{}/cancel", job.id),
            &token_for(owner),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "failed");
    assert_eq!(body["message"], "Job cancelled by user");

    let stored = harness.store.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    assert_eq!(
        stored.error_message.as_deref(),
        Some("Job cancelled by user")
    );

    // A terminal job cannot be re-cancelled
    let response = app(&harness)
        .oneshot(post(
            &format!("/api/v1/jobs/{}/cancel", job.id),
            &token_for(owner),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cancel_processing_sets_marker() {
    let harness = harness(Environment::Development);
    let owner = Uuid::new_v4();
    let job = seeded_job(&harness.store, owner, JobStatus::Processing).await;

    let response = app(&harness)
        .oneshot(post(
            &format!("/api/v1/jobs/{}/cancel", job.id),
            &token_for(owner),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert!(harness
        .broker
        .get(&keys::job_cancel(job.id))
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_download_requires_completion_and_artifact() {
    let harness = harness(Environment::Development);
    let owner = Uuid::new_v4();

    // Still processing: 404
    let processing = seeded_job(&harness.store, owner, JobStatus::Processing).await;
    let response = app(&harness)
        .oneshot(get(
            &format!("/api/v1/jobs/{}/download", processing.id),
            &token_for(owner),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Completed with an artifact: signed URL
    let completed = seeded_job(&harness.store, owner, JobStatus::Completed).await;
    harness
        .store
        .update_job(
            completed.id,
            &JobUpdate {
                video_url: Some("mem://video".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    harness
        .objects
        .upload(
            VIDEO_BUCKET,
            &format!("{}/final_video.mp4", completed.id),
            vec![1],
            "video/mp4",
        )
        .await
        .unwrap();

    let response = app(&harness)
        .oneshot(get(
            &format!("/api/v1/jobs/{}/download", completed.id),
            &token_for(owner),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["expires_in"], 3600);
    assert_eq!(
        body["filename"],
        format!("music_video_{}.mp4", completed.id)
    );
    assert!(body["download_url"].as_str().unwrap().contains("signed"));
}

#[tokio::test]
async fn test_stream_replays_current_state_first() {
    let harness = harness(Environment::Development);
    let owner = Uuid::new_v4();
    let job = seeded_job(&harness.store, owner, JobStatus::Processing).await;
    harness
        .store
        .update_job(
            job.id,
            &JobUpdate {
                progress: Some(20),
                current_stage: Some("scene_planner".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // EventSource clients pass the token as a query parameter
    let uri = format!("/api/v1/jobs/{}/stream?token={}", job.id, token_for(owner));
    let request = Request::builder()
        .method("GET")
        .uri(&uri)
        .body(Body::empty())
        .unwrap();
    let response = app(&harness).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/event-stream"
    );

    let mut chunks = response.into_body().into_data_stream();
    let first = chunks.next().await.unwrap().unwrap();
    let text = String::from_utf8(first.to_vec()).unwrap();
    assert!(text.starts_with("event: progress\n"));
    assert!(text.contains("\"progress\":20"));
    assert!(text.contains("scene_planner"));
}

#[tokio::test]
async fn test_stream_connection_cap() {
    let harness = harness(Environment::Development);
    let owner = Uuid::new_v4();
    let job = seeded_job(&harness.store, owner, JobStatus::Processing).await;
    let token = token_for(owner);

    let mut held = Vec::new();
    for _ in 0..10 {
        let uri = format!("/api/v1/jobs/{}/stream?token={}", job.id, token);
        let request = Request::builder()
            .method("GET")
            .uri(&uri)
            .body(Body::empty())
            .unwrap();
        let response = app(&harness).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        held.push(response);
    }

    let uri = format!("/api/v1/jobs/{}/stream?token={}", job.id, token);
    let request = Request::builder()
        .method("GET")
        .uri(&uri)
        .body(Body::empty())
        .unwrap();
    let response = app(&harness).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = json_body(response).await;
    assert_eq!(body["code"], "MAX_CONNECTIONS");
}

#[tokio::test]
async fn test_health_reports_healthy_backends() {
    let harness = harness(Environment::Development);
    let request = Request::builder()
        .method("GET")
        .uri("/api/v1/health")
        .body(Body::empty())
        .unwrap();
    let response = app(&harness).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], "connected");
    assert_eq!(body["redis"], "connected");
    assert!(body["queue"]["size"].is_number());
}

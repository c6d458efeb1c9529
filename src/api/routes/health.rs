//! Health endpoint

use crate::api::state::SharedState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};

/// `GET /api/v1/health` — probe store, broker, and queue depth
pub async fn health_check(State(state): State<SharedState>) -> (StatusCode, Json<Value>) {
    let mut issues: Vec<&str> = Vec::new();

    let store_healthy = state.store.health_check().await;
    if !store_healthy {
        issues.push("database connection failed");
    }

    let broker_healthy = state.broker.ping().await.is_ok();
    if !broker_healthy {
        issues.push("redis connection failed");
    }

    let queue_size = match state.queue.depth().await {
        Ok(size) => Some(size),
        Err(_) => {
            issues.push("queue connection failed");
            None
        }
    };

    let healthy = issues.is_empty();
    let mut body = json!({
        "status": if healthy { "healthy" } else { "unhealthy" },
        "timestamp": Utc::now(),
        "queue": {
            "size": queue_size.unwrap_or(0),
        },
        "database": if store_healthy { "connected" } else { "disconnected" },
        "redis": if broker_healthy { "connected" } else { "disconnected" },
    });
    if !healthy {
        body["issues"] = json!(issues);
    }

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

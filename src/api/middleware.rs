//! Request middleware
//!
//! Every request gets a fresh correlation identifier, attached to the
//! logging context and echoed back in the `X-Request-ID` response header.

use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use tracing::info;
use uuid::Uuid;

/// Correlation identifier carried through a request's lifetime
#[derive(Debug, Clone, Copy)]
pub struct RequestId(pub Uuid);

/// Assign a request id, log the request, and echo the id on the response
pub async fn request_id(mut request: Request, next: Next) -> Response {
    let id = Uuid::new_v4();
    request.extensions_mut().insert(RequestId(id));

    info!(
        request_id = %id,
        method = %request.method(),
        path = %request.uri().path(),
        "request started"
    );

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&id.to_string()) {
        response.headers_mut().insert("X-Request-ID", value);
    }
    response
}

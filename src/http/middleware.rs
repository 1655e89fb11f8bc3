//! Axum middleware implementing the admission contract.
//!
//! Layer this in front of the routes to protect; denied requests are
//! answered with HTTP 429, a `Retry-After` header, and a JSON body, and
//! never reach the inner handler.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use crate::admission::{AdmissionGate, AdmissionRequest, Verdict};

/// Per-request admission check.
///
/// The subject is `client identity + request path`: identity comes from the
/// first `X-Forwarded-For` entry when present, the peer address otherwise.
/// Use with [`axum::middleware::from_fn_with_state`] and an
/// `Arc<AdmissionGate>` as state.
pub async fn admission_middleware(
    State(gate): State<Arc<AdmissionGate>>,
    request: Request,
    next: Next,
) -> Response {
    let descriptor = AdmissionRequest {
        client: client_identity(&request),
        operation: request.uri().path().to_string(),
    };

    match gate.decide(&descriptor) {
        Verdict::Allowed => next.run(request).await,
        Verdict::Denied { retry_after_secs } => denied_response(retry_after_secs),
    }
}

/// Best-effort client identity for keying.
fn client_identity(request: &Request) -> String {
    let forwarded = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());

    if let Some(client) = forwarded {
        return client.to_string();
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// The 429 response shared by the middleware and the check endpoint.
pub(crate) fn denied_response(retry_after_secs: u64) -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        [(header::RETRY_AFTER, retry_after_secs.to_string())],
        Json(serde_json::json!({
            "success": false,
            "message": "Too many requests, please retry later",
            "retryAfter": retry_after_secs,
        })),
    )
        .into_response()
}

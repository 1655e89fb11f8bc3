//! HTTP server exposing the admission check endpoint.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tracing::{debug, info, warn};

use super::middleware::denied_response;
use crate::admission::{AdmissionGate, AdmissionRequest, Verdict};
use crate::error::Result;

/// HTTP server for the admission check service.
///
/// Lets an out-of-process collaborator (a front proxy, a gateway) consult
/// the gate per inbound request via `POST /v1/check`.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// The admission gate instance
    gate: Arc<AdmissionGate>,
}

impl HttpServer {
    /// Create a new HTTP server over an admission gate.
    pub fn new(addr: SocketAddr, gate: Arc<AdmissionGate>) -> Self {
        Self { addr, gate }
    }

    /// Build the service router.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/healthz", get(health))
            .route("/v1/check", post(check))
            .with_state(Arc::clone(&self.gate))
    }

    /// Start the server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let router = self.router();

        info!(addr = %self.addr, "Starting HTTP server for admission checks");

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await?;

        Ok(())
    }
}

/// Liveness probe.
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Admission check for a remote collaborator.
async fn check(
    State(gate): State<Arc<AdmissionGate>>,
    Json(request): Json<AdmissionRequest>,
) -> Response {
    if request.client.is_empty() {
        warn!("Received admission check with empty client");
        return invalid_request("client is required");
    }
    if request.operation.is_empty() {
        warn!("Received admission check with empty operation");
        return invalid_request("operation is required");
    }

    let verdict = gate.decide(&request);
    debug!(
        client = %request.client,
        operation = %request.operation,
        allowed = verdict.is_allowed(),
        "Admission decision made"
    );

    match verdict {
        Verdict::Allowed => Json(serde_json::json!({ "success": true })).into_response(),
        Verdict::Denied { retry_after_secs } => denied_response(retry_after_secs),
    }
}

fn invalid_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({
            "success": false,
            "message": message,
        })),
    )
        .into_response()
}

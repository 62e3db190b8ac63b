//! Admission webhook server.
//!
//! Provides HTTP endpoints for Kubernetes admission webhooks:
//! - `POST /mutate` - injects requested CA bundles into pods
//! - `POST /validate` - always allows
//! - `GET /health` - liveness, `{"status":"ok"}`
//!
//! To enable webhooks:
//! 1. Deploy cert-manager (or any issuer) for the serving certificate
//! 2. Create MutatingWebhookConfiguration and ValidatingWebhookConfiguration
//!    objects pointing at the service
//! 3. Mount the TLS certificate secret to the injector pod at /etc/webhook/certs/
//!
//! Without certificates the server falls back to plain HTTP, which is only
//! useful for local development.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use kube::core::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use tracing::{debug, error, info, warn};

use super::mutation::MutationEngine;
use super::validation;
use crate::error::Error;
use crate::health::{self, HealthState};

/// Default path to webhook TLS certificate
pub const WEBHOOK_CERT_PATH: &str = "/etc/webhook/certs/tls.crt";
/// Default path to webhook TLS private key
pub const WEBHOOK_KEY_PATH: &str = "/etc/webhook/certs/tls.key";
/// Default webhook server port
pub const WEBHOOK_PORT: u16 = 9443;

const MUTATE: &str = "mutate";
const VALIDATE: &str = "validate";

/// Shared state for webhook handlers
pub struct WebhookState {
    pub engine: MutationEngine,
    pub health_state: Option<Arc<HealthState>>,
}

impl WebhookState {
    pub fn new(engine: MutationEngine) -> Self {
        Self {
            engine,
            health_state: None,
        }
    }

    /// Record admission metrics on the given health state
    pub fn with_health_state(mut self, health_state: Arc<HealthState>) -> Self {
        self.health_state = Some(health_state);
        self
    }

    fn record(&self, reviewer: &str, result: &str, started: Instant) {
        if let Some(ref state) = self.health_state {
            state
                .metrics
                .record_admission(reviewer, result, started.elapsed().as_secs_f64());
        }
    }
}

/// Engine failure rendered as `{"error": message}`
struct ReviewFailure(Error);

impl IntoResponse for ReviewFailure {
    fn into_response(self) -> Response {
        let status = if self.0.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (status, Json(serde_json::json!({"error": self.0.to_string()}))).into_response()
    }
}

/// Create the webhook router
pub fn create_webhook_router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route("/mutate", post(mutate))
        .route("/validate", post(validate))
        .route("/health", get(health::health))
        .with_state(state)
}

/// Decode a raw AdmissionReview body.
///
/// On failure the ready-made 400 answer is returned instead.
fn parse_review(body: &[u8]) -> Result<AdmissionRequest<DynamicObject>, Response> {
    let invalid = |message: String| {
        (
            StatusCode::BAD_REQUEST,
            Json(AdmissionResponse::invalid(message).into_review()),
        )
            .into_response()
    };

    let review: AdmissionReview<DynamicObject> = serde_json::from_slice(body).map_err(|e| {
        warn!(error = %e, "Failed to parse AdmissionReview body");
        invalid(format!("Invalid AdmissionReview: {}", e))
    })?;

    let request: Result<AdmissionRequest<DynamicObject>, _> = review.try_into();
    request.map_err(|e| {
        warn!(error = %e, "Failed to extract admission request");
        invalid(format!("Invalid AdmissionReview: {}", e))
    })
}

/// Mutating admission handler
async fn mutate(State(state): State<Arc<WebhookState>>, body: Bytes) -> Response {
    let started = Instant::now();
    let request = match parse_review(&body) {
        Ok(request) => request,
        Err(response) => {
            state.record(MUTATE, "invalid", started);
            return response;
        }
    };

    debug!(
        uid = %request.uid,
        operation = ?request.operation,
        namespace = ?request.namespace,
        name = %request.name,
        "Processing mutation request"
    );

    match state.engine.review(&request).await {
        Ok(response) => {
            state.record(MUTATE, "allowed", started);
            (StatusCode::OK, Json(response.into_review())).into_response()
        }
        Err(e) => {
            if e.is_client_error() {
                warn!(uid = %request.uid, reason = e.reason(), error = %e, "Rejected mutation request");
            } else {
                error!(uid = %request.uid, reason = e.reason(), error = %e, "Mutation failed");
            }
            state.record(MUTATE, e.reason(), started);
            ReviewFailure(e).into_response()
        }
    }
}

/// Validating admission handler
async fn validate(State(state): State<Arc<WebhookState>>, body: Bytes) -> Response {
    let started = Instant::now();
    let request = match parse_review(&body) {
        Ok(request) => request,
        Err(response) => {
            state.record(VALIDATE, "invalid", started);
            return response;
        }
    };

    match validation::review(&request) {
        Ok(response) => {
            state.record(VALIDATE, "allowed", started);
            (StatusCode::OK, Json(response.into_review())).into_response()
        }
        Err(e) => {
            error!(uid = %request.uid, error = %e, "Validation failed");
            state.record(VALIDATE, e.reason(), started);
            ReviewFailure(e).into_response()
        }
    }
}

/// Errors that can occur when running the webhook server
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// TLS configuration error
    #[error("TLS configuration error: {0}")]
    TlsConfig(String),
    /// Server error
    #[error("Webhook server error: {0}")]
    Server(String),
}

/// Run the webhook server
///
/// Binds to 0.0.0.0:9443 and serves `/mutate` and `/validate`. Uses TLS when
/// both certificate files exist, plain HTTP otherwise.
///
/// # Arguments
/// * `state` - Shared handler state
/// * `cert_path` - Path to TLS certificate file (PEM format)
/// * `key_path` - Path to TLS private key file (PEM format)
pub async fn run_webhook_server(
    state: Arc<WebhookState>,
    cert_path: &str,
    key_path: &str,
) -> Result<(), WebhookError> {
    use axum_server::tls_rustls::RustlsConfig;

    let app = create_webhook_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], WEBHOOK_PORT));

    if !(Path::new(cert_path).exists() && Path::new(key_path).exists()) {
        warn!(
            cert_path = %cert_path,
            port = WEBHOOK_PORT,
            "Webhook certificates not found, serving plain HTTP"
        );
        return axum_server::bind(addr)
            .serve(app.into_make_service())
            .await
            .map_err(|e| WebhookError::Server(e.to_string()));
    }

    let config = RustlsConfig::from_pem_file(cert_path, key_path)
        .await
        .map_err(|e| WebhookError::TlsConfig(e.to_string()))?;

    info!(port = WEBHOOK_PORT, "Webhook server listening with TLS");

    axum_server::bind_rustls(addr, config)
        .serve(app.into_make_service())
        .await
        .map_err(|e| WebhookError::Server(e.to_string()))
}

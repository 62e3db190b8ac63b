//! Health server for Kubernetes probes and Prometheus metrics.
//!
//! Provides:
//! - `/healthz` - Liveness probe (always returns 200 if server is running)
//! - `/health` - Liveness probe answering `{"status":"ok"}`, also served on the
//!   webhook port
//! - `/readyz` - Readiness probe (returns 200 once a config generation is published)
//! - `/metrics` - Prometheus metrics endpoint

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::{EncodeLabel, EncodeLabelSet, LabelSetEncoder};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use tokio::sync::RwLock;
use tracing::info;

/// Default health server port
pub const HEALTH_PORT: u16 = 8080;

/// Labels for admission outcome metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct AdmissionLabels {
    pub reviewer: String,
    pub result: String,
}

impl EncodeLabelSet for AdmissionLabels {
    fn encode(&self, mut encoder: LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("reviewer", self.reviewer.as_str()).encode(encoder.encode_label())?;
        ("result", self.result.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Labels keyed by reviewer only
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct ReviewerLabels {
    pub reviewer: String,
}

impl EncodeLabelSet for ReviewerLabels {
    fn encode(&self, mut encoder: LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("reviewer", self.reviewer.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Single `result`/`outcome` style label
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct OutcomeLabels {
    pub outcome: String,
}

impl EncodeLabelSet for OutcomeLabels {
    fn encode(&self, mut encoder: LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("outcome", self.outcome.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Shared metrics for the injector
pub struct Metrics {
    /// Admission requests by reviewer and result
    pub admission_requests_total: Family<AdmissionLabels, Counter>,
    /// Admission handling duration
    pub admission_duration_seconds: Family<ReviewerLabels, Histogram>,
    /// Config reload attempts by outcome
    pub config_reloads_total: Family<OutcomeLabels, Counter>,
    /// Bundles in the published config generation
    pub bundles_loaded: Gauge,
    /// Bundle ConfigMap upserts by outcome
    pub configmap_syncs_total: Family<OutcomeLabels, Counter>,
    /// Prometheus registry
    registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create a new metrics instance with registered metrics
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let admission_requests_total = Family::<AdmissionLabels, Counter>::default();
        registry.register(
            "cainjector_admission_requests",
            "Total number of admission requests",
            admission_requests_total.clone(),
        );

        let admission_duration_seconds =
            Family::<ReviewerLabels, Histogram>::new_with_constructor(|| {
                Histogram::new(exponential_buckets(0.001, 2.0, 15))
            });
        registry.register(
            "cainjector_admission_duration_seconds",
            "Duration of admission handling in seconds",
            admission_duration_seconds.clone(),
        );

        let config_reloads_total = Family::<OutcomeLabels, Counter>::default();
        registry.register(
            "cainjector_config_reloads",
            "Total number of config reload attempts",
            config_reloads_total.clone(),
        );

        let bundles_loaded = Gauge::default();
        registry.register(
            "cainjector_bundles_loaded",
            "Number of bundles in the active config",
            bundles_loaded.clone(),
        );

        let configmap_syncs_total = Family::<OutcomeLabels, Counter>::default();
        registry.register(
            "cainjector_configmap_syncs",
            "Total number of bundle ConfigMap synchronizations",
            configmap_syncs_total.clone(),
        );

        Self {
            admission_requests_total,
            admission_duration_seconds,
            config_reloads_total,
            bundles_loaded,
            configmap_syncs_total,
            registry,
        }
    }

    /// Record a handled admission request
    pub fn record_admission(&self, reviewer: &str, result: &str, duration_secs: f64) {
        self.admission_requests_total
            .get_or_create(&AdmissionLabels {
                reviewer: reviewer.to_string(),
                result: result.to_string(),
            })
            .inc();
        self.admission_duration_seconds
            .get_or_create(&ReviewerLabels {
                reviewer: reviewer.to_string(),
            })
            .observe(duration_secs);
    }

    /// Record a config reload attempt
    pub fn record_config_reload(&self, success: bool) {
        let outcome = if success { "success" } else { "failure" };
        self.config_reloads_total
            .get_or_create(&OutcomeLabels {
                outcome: outcome.to_string(),
            })
            .inc();
    }

    /// Update the number of loaded bundles
    pub fn set_bundles_loaded(&self, count: i64) {
        self.bundles_loaded.set(count);
    }

    /// Record a ConfigMap synchronization outcome
    pub fn record_sync(&self, outcome: &str) {
        self.configmap_syncs_total
            .get_or_create(&OutcomeLabels {
                outcome: outcome.to_string(),
            })
            .inc();
    }

    /// Encode metrics to Prometheus text format
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        if encode(&mut buffer, &self.registry).is_err() {
            tracing::error!("Failed to encode metrics");
            return "# Error encoding metrics".to_string();
        }
        buffer
    }
}

/// Shared state for the health server
pub struct HealthState {
    /// Whether a config generation has been published
    ready: RwLock<bool>,
    /// Metrics registry
    pub metrics: Metrics,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    /// Create a new health state (starts as not ready)
    pub fn new() -> Self {
        Self {
            ready: RwLock::new(false),
            metrics: Metrics::new(),
        }
    }

    /// Mark the injector as ready or not ready
    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    /// Check if the injector is ready
    pub async fn is_ready(&self) -> bool {
        *self.ready.read().await
    }
}

/// Liveness probe handler
async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// JSON liveness handler shared with the webhook router
pub(crate) async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Readiness probe handler
///
/// Returns 503 Service Unavailable until ready.
async fn readyz(State(state): State<Arc<HealthState>>) -> Response {
    if state.is_ready().await {
        (StatusCode::OK, "ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready").into_response()
    }
}

/// Metrics handler
async fn metrics_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let body = state.metrics.encode();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

/// Create the health server router
pub fn create_router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/health", get(health))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Run the health server
///
/// Binds to 0.0.0.0:8080 and serves health/metrics endpoints.
pub async fn run_health_server(state: Arc<HealthState>) -> Result<(), std::io::Error> {
    let app = create_router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], HEALTH_PORT));
    info!(port = HEALTH_PORT, "Starting health server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

//! Prometheus metrics endpoint handler.
//!
//! The endpoint is unauthenticated so Prometheus can scrape it. Labels are
//! bounded; no token contents are exported.

use axum::{extract::State, response::IntoResponse};
use metrics_exporter_prometheus::PrometheusHandle;

/// Handler for GET /metrics
///
/// ```text
/// # TYPE pki_token_validations_total counter
/// pki_token_validations_total{status="success",error_type="none"} 42
/// ```
#[tracing::instrument(skip_all, name = "pki.metrics.scrape")]
pub async fn metrics_handler(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    handle.render()
}

//! Metrics definitions for the PKI API.
//!
//! All metrics follow Prometheus naming conventions:
//! - `pki_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `method`: HTTP methods
//! - `endpoint`: the few static routes, everything else is `/other`
//! - `status`: success, error, timeout
//! - `error_type`: bounded by `TokenRejection` variants
//!
//! Issuer identifiers are never used as labels.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize the Prometheus metrics recorder and return the handle
/// used to serve `/metrics`.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("pki_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.150, 0.200, 0.300, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        // Verification is CPU-only; RSA verify is well under a millisecond
        .set_buckets_for_metric(
            Matcher::Prefix("pki_token_validation".to_string()),
            &[
                0.0001, 0.00025, 0.0005, 0.001, 0.0025, 0.005, 0.010, 0.025, 0.050,
            ],
        )
        .map_err(|e| format!("Failed to set token validation buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("pki_issuer_setup".to_string()),
            &[0.010, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000],
        )
        .map_err(|e| format!("Failed to set issuer setup buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `pki_http_requests_total`, `pki_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status`
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("pki_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("pki_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Categorize HTTP status code into success/error/timeout
fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Map a request path onto a fixed set of endpoint labels.
fn normalize_endpoint(path: &str) -> &'static str {
    match path {
        "/" => "/",
        "/health" => "/health",
        "/metrics" => "/metrics",
        "/api/v1/me" => "/api/v1/me",
        _ => "/other",
    }
}

// ============================================================================
// Issuer Registry Metrics
// ============================================================================

/// Record the outcome of setting up one issuer.
///
/// Metric: `pki_issuer_setup_total`, `pki_issuer_setup_duration_seconds`
/// Labels: `status` ("success" or "error")
pub fn record_issuer_setup(status: &str, duration: Duration) {
    histogram!("pki_issuer_setup_duration_seconds",
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("pki_issuer_setup_total",
        "status" => status.to_string()
    )
    .increment(1);
}

/// Number of usable issuers in the frozen registry.
///
/// Metric: `pki_registry_issuers`
pub fn set_registry_issuers(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("pki_registry_issuers").set(count as f64);
}

// ============================================================================
// Token Validation Metrics
// ============================================================================

/// Record a bearer token verification.
///
/// Metric: `pki_token_validations_total`, `pki_token_validation_duration_seconds`
/// Labels: `status`, `error_type`
///
/// # Arguments
///
/// * `status` - "success" or "error"
/// * `error_type` - Rejection reason for failures (e.g., "unknown_issuer")
/// * `duration` - Time spent in the verifier
pub fn record_token_validation(status: &str, error_type: Option<&str>, duration: Duration) {
    histogram!("pki_token_validation_duration_seconds",
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("pki_token_validations_total",
        "status" => status.to_string(),
        "error_type" => error_type.unwrap_or("none").to_string()
    )
    .increment(1);
}

/// Sum a counter's values per value of `label`, from a debugging recorder.
#[cfg(test)]
pub(crate) fn counter_by_label(
    snapshotter: &metrics_util::debugging::Snapshotter,
    name: &str,
    label: &str,
) -> std::collections::HashMap<String, u64> {
    use metrics_util::debugging::DebugValue;

    let mut counts = std::collections::HashMap::new();
    for (composite, _, _, value) in snapshotter.snapshot().into_vec() {
        let key = composite.key();
        if key.name() != name {
            continue;
        }
        if let DebugValue::Counter(count) = value {
            let label_value = key
                .labels()
                .find(|l| l.key() == label)
                .map(|l| l.value().to_string())
                .unwrap_or_default();
            *counts.entry(label_value).or_insert(0) += count;
        }
    }
    counts
}

// ============================================================================
// Tests
// ============================================================================

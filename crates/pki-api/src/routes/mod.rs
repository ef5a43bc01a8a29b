//! HTTP routes for the PKI API.
//!
//! Defines the Axum router and application state.

use crate::auth::TokenVerifier;
use crate::config::Config;
use crate::handlers;
use crate::middleware::{cors_layer, http_metrics_middleware, with_auth};
use axum::{middleware, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Config,

    /// Verifier over the issuer registry built at startup.
    pub verifier: Arc<TokenVerifier>,

    /// Configured issuers that were excluded during setup.
    pub failed_issuers: usize,
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/health` - Issuer registry status (public)
/// - `/metrics` - Prometheus metrics endpoint (public)
/// - `/api/v1/me` - Verified claims of the caller (requires a valid bearer token)
/// - Claim annotation on every request
/// - CORS for the configured browser origins
/// - TraceLayer for request logging
/// - 30 second request timeout
/// - HTTP metrics for all responses
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let verifier = state.verifier.clone();
    let cors = cors_layer(&state.config.allowed_origins);

    let app_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/api/v1/me", get(handlers::get_me))
        .with_state(state);

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Layer order (bottom-to-top execution):
    // 1. annotate_claims - Attach verified claims (innermost)
    // 2. TraceLayer - Log request details
    // 3. TimeoutLayer - Timeout the request
    // 4. CorsLayer - Answer preflights before auth runs
    // 5. http_metrics_middleware - Record ALL responses (outermost)
    with_auth(app_routes.merge(metrics_routes), verifier)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(cors)
        .layer(middleware::from_fn(http_metrics_middleware))
}

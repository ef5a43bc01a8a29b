//! Health check handler.
//!
//! Reports which issuers made it into the registry at startup.

use crate::routes::AppState;
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;

/// Response for `/health` endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// "healthy" when every configured issuer was set up, "degraded" otherwise.
    pub status: String,

    /// Number of issuers tokens are accepted from.
    pub issuers: usize,

    /// Number of configured issuers excluded during setup.
    pub failed_issuers: usize,
}

/// Health check handler.
///
/// Always answers 200 so the process stays reachable; a degraded status
/// means some tokens will be refused until the service is restarted.
///
/// ```json
/// {
///   "status": "healthy",
///   "issuers": 2,
///   "failed_issuers": 0
/// }
/// ```
#[instrument(skip_all, name = "pki.health.check")]
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let issuers = state.verifier.registry().len();

    let status = if state.failed_issuers == 0 {
        "healthy"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status: status.to_string(),
        issuers,
        failed_issuers: state.failed_issuers,
    })
}

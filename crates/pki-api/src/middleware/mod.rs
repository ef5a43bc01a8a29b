//! Middleware for the PKI API.
//!
//! # Components
//!
//! - `auth` - annotates requests with verified bearer token claims
//! - `cors` - origin allowlist for browser clients
//! - `http_metrics` - records request metrics for every response

pub mod auth;
pub mod cors;
pub mod http_metrics;

pub use auth::{
    annotate_claims, extract_bearer_token, with_auth, AuthState, Authenticated, ClaimsExt,
};
pub use cors::cors_layer;
pub use http_metrics::http_metrics_middleware;

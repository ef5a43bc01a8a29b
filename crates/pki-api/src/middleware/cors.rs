//! CORS policy for browser clients.
//!
//! Only origins listed in `ALLOWED_ORIGINS` get CORS headers; an empty list
//! allows none. Credentials are never allowed, so bearer tokens must be sent
//! explicitly in the `Authorization` header.

use axum::http::{header, HeaderValue, Method};
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};

/// Build the CORS layer for the exact-match origin allowlist.
pub fn cors_layer(allowed_origins: &[HeaderValue]) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins.iter().cloned()))
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .max_age(Duration::from_secs(60 * 10))
}

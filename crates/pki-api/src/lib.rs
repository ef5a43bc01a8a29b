//! PKI API Service Library
//!
//! Accepts bearer tokens from any number of trusted OpenID Connect issuers.
//!
//! At startup every configured issuer's discovery document and JWKS are
//! fetched concurrently. Issuers that fail are logged and left out; the rest
//! form a read-only registry that every request is verified against without
//! further network access.
//!
//! # Modules
//!
//! - `auth` - Discovery, JWKS, issuer registry and token verification
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - Claim annotation and HTTP metrics
//! - `observability` - Prometheus metrics
//! - `routes` - Axum router setup

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod routes;

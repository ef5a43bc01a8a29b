//! Authentication middleware.
//!
//! Extracts a Bearer token from the Authorization header, verifies it and
//! attaches the [`VerifiedClaims`] to the request extensions. The middleware
//! never rejects a request: a missing, malformed or invalid credential simply
//! leaves the request without claims. Handlers that need an identity use the
//! [`Authenticated`] extractor, which answers 401 when no claims are attached.
//!
//! Verification does no network I/O, so it cannot outlast the fetch timeout
//! used during issuer setup.

use crate::auth::{TokenVerifier, VerifiedClaims};
use crate::errors::ApiError;
use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    middleware::{self, Next},
    response::Response,
    Router,
};
use std::sync::Arc;
use tracing::instrument;

/// State for the authentication middleware.
#[derive(Clone)]
pub struct AuthState {
    /// Verifier holding the frozen issuer registry.
    pub verifier: Arc<TokenVerifier>,
}

/// Wrap `router` so every request is annotated with verified claims.
pub fn with_auth<S>(router: Router<S>, verifier: Arc<TokenVerifier>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(middleware::from_fn_with_state(
        AuthState { verifier },
        annotate_claims,
    ))
}

/// Return the token of an `Authorization: Bearer <token>` header.
///
/// The scheme is case-insensitive and the value must be exactly two
/// whitespace-separated parts. Anything else counts as no credential.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;

    let mut parts = value.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(token), None) if scheme.eq_ignore_ascii_case("bearer") => Some(token),
        _ => None,
    }
}

/// Middleware that attaches verified claims and always forwards the request.
///
/// # Authorization Header Format
///
/// ```text
/// Authorization: Bearer <token>
/// ```
#[instrument(skip_all, name = "pki.middleware.auth")]
pub async fn annotate_claims(
    State(state): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Response {
    let outcome = extract_bearer_token(req.headers()).map(|token| state.verifier.verify(token));

    match outcome {
        None => {
            tracing::debug!(target: "pki.middleware.auth", "No bearer credential presented");
        }
        Some(Ok(claims)) => {
            req.extensions_mut().insert(claims);
        }
        Some(Err(rejection)) => {
            tracing::debug!(
                target: "pki.middleware.auth",
                reason = rejection.reason(),
                "Bearer credential rejected, forwarding unauthenticated"
            );
        }
    }

    next.run(req).await
}

/// Extension trait for reading verified claims from a request.
pub trait ClaimsExt {
    /// `None` means the request is unauthenticated.
    fn claims(&self) -> Option<&VerifiedClaims>;
}

impl<B> ClaimsExt for axum::http::Request<B> {
    fn claims(&self) -> Option<&VerifiedClaims> {
        self.extensions().get::<VerifiedClaims>()
    }
}

/// Extractor that requires verified claims, rejecting with 401 otherwise.
#[derive(Debug, Clone)]
pub struct Authenticated(pub VerifiedClaims);

#[async_trait]
impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<VerifiedClaims>()
            .cloned()
            .map(Authenticated)
            .ok_or(ApiError::Unauthenticated)
    }
}

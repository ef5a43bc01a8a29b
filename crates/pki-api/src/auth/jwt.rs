//! Bearer token verification against the issuer registry.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Only asymmetric algorithms are accepted; `HS*` and `none` never reach key lookup
//! - The issuer claim is read unverified only to choose the issuer; it is
//!   checked again by the signature verification step
//! - The header algorithm must be compatible with the resolved key's type
//! - Every rejection carries the same generic message
//!
//! Verification does no I/O. All key material was loaded during setup.

use crate::auth::claims::VerifiedClaims;
use crate::auth::jwks::Jwk;
use crate::auth::registry::IssuerRegistry;
use crate::observability::metrics;
use common::jwt::{decode_header, decode_segment, split_token, validate_iat, JwtValidationError};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::instrument;

/// Algorithms a token may declare.
const ACCEPTED_ALGORITHMS: [Algorithm; 9] = [
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
    Algorithm::ES256,
    Algorithm::ES384,
    Algorithm::EdDSA,
];

/// Why a token was rejected.
///
/// Every variant displays the same message. The variant itself is only for
/// logs and metrics.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TokenRejection {
    #[error("The access token is invalid or expired")]
    Malformed,

    #[error("The access token is invalid or expired")]
    UnsupportedAlgorithm,

    #[error("The access token is invalid or expired")]
    UnknownIssuer,

    #[error("The access token is invalid or expired")]
    KeyNotFound,

    #[error("The access token is invalid or expired")]
    UnsupportedKey,

    #[error("The access token is invalid or expired")]
    AlgorithmMismatch,

    #[error("The access token is invalid or expired")]
    InvalidSignature,

    #[error("The access token is invalid or expired")]
    ClaimsRejected,
}

impl TokenRejection {
    /// Bounded label for logs and metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            TokenRejection::Malformed => "malformed",
            TokenRejection::UnsupportedAlgorithm => "unsupported_algorithm",
            TokenRejection::UnknownIssuer => "unknown_issuer",
            TokenRejection::KeyNotFound => "key_not_found",
            TokenRejection::UnsupportedKey => "unsupported_key",
            TokenRejection::AlgorithmMismatch => "algorithm_mismatch",
            TokenRejection::InvalidSignature => "invalid_signature",
            TokenRejection::ClaimsRejected => "claims_rejected",
        }
    }
}

impl From<JwtValidationError> for TokenRejection {
    fn from(err: JwtValidationError) -> Self {
        match err {
            JwtValidationError::TokenTooLarge | JwtValidationError::MalformedToken => {
                TokenRejection::Malformed
            }
            JwtValidationError::IatTooFarInFuture => TokenRejection::ClaimsRejected,
        }
    }
}

/// Verifies bearer tokens against a frozen issuer registry.
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    registry: Arc<IssuerRegistry>,

    /// Leeway for `exp`, `nbf` and `iat`.
    clock_skew: Duration,
}

impl TokenVerifier {
    pub fn new(registry: Arc<IssuerRegistry>, clock_skew: Duration) -> Self {
        Self {
            registry,
            clock_skew,
        }
    }

    pub fn registry(&self) -> &IssuerRegistry {
        &self.registry
    }

    /// Verify a compact JWS and return its claims.
    ///
    /// # Security Checks
    ///
    /// 1. Size and structure - exactly three segments, at most 8KB
    /// 2. Header - decodes, declares an accepted asymmetric algorithm
    /// 3. Issuer - the unverified `iss` must name a registered issuer
    /// 4. Key - resolved by `kid`, then by `x5t`; none is a rejection
    /// 5. Key/algorithm compatibility
    /// 6. Signature, then `iss`, `exp` and `nbf` when present
    /// 7. `iat` no further in the future than the clock skew
    ///
    /// # Errors
    ///
    /// Returns a `TokenRejection`; all variants display the same message.
    #[instrument(skip_all, name = "pki.auth.verify")]
    pub fn verify(&self, token: &str) -> Result<VerifiedClaims, TokenRejection> {
        let start = Instant::now();
        let result = self.verify_token(token);
        let duration = start.elapsed();

        match &result {
            Ok(claims) => {
                tracing::debug!(
                    target: "pki.auth.jwt",
                    issuer = %claims.issuer(),
                    "Token verified"
                );
                metrics::record_token_validation("success", None, duration);
            }
            Err(rejection) => {
                tracing::debug!(
                    target: "pki.auth.jwt",
                    reason = rejection.reason(),
                    "Token rejected"
                );
                metrics::record_token_validation("error", Some(rejection.reason()), duration);
            }
        }

        result
    }

    fn verify_token(&self, token: &str) -> Result<VerifiedClaims, TokenRejection> {
        let parts = split_token(token)?;
        let header = decode_header(parts.header)?;
        let algorithm = accepted_algorithm(&header.alg)?;

        let claimed_issuer = peek_issuer(parts.payload)?;
        let issuer = self.registry.find(&claimed_issuer).ok_or_else(|| {
            tracing::debug!(target: "pki.auth.jwt", "Token names an unregistered issuer");
            TokenRejection::UnknownIssuer
        })?;

        let jwk = issuer
            .keys()
            .resolve(header.key_id(), header.thumbprint())
            .ok_or_else(|| {
                tracing::debug!(
                    target: "pki.auth.jwt",
                    issuer = %issuer.identifier(),
                    kid = ?header.key_id(),
                    x5t = ?header.thumbprint(),
                    "No key matches token header"
                );
                TokenRejection::KeyNotFound
            })?;

        let decoding_key = decoding_key_for(jwk, algorithm)?;

        let mut validation = Validation::new(algorithm);
        validation.required_spec_claims = HashSet::new();
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.validate_aud = false;
        validation.leeway = self.clock_skew.as_secs();
        validation.set_issuer(&[issuer.identifier()]);

        let token_data = jsonwebtoken::decode::<Value>(token, &decoding_key, &validation)
            .map_err(|e| {
                let rejection = classify_jwt_error(e.kind());
                tracing::debug!(
                    target: "pki.auth.jwt",
                    error = %e,
                    reason = rejection.reason(),
                    "Token verification failed"
                );
                rejection
            })?;

        if let Some(iat) = token_data.claims.get("iat") {
            let iat = iat.as_i64().ok_or_else(|| {
                tracing::debug!(target: "pki.auth.jwt", "Token iat is not an integer");
                TokenRejection::ClaimsRejected
            })?;
            validate_iat(iat, self.clock_skew)?;
        }

        let raw = String::from_utf8(decode_segment(parts.payload)?).map_err(|_| {
            tracing::debug!(target: "pki.auth.jwt", "Token payload is not UTF-8");
            TokenRejection::Malformed
        })?;

        Ok(VerifiedClaims::new(
            issuer.identifier().to_string(),
            raw,
            token_data.claims,
        ))
    }
}

/// The only field read from an unverified payload.
#[derive(Deserialize)]
struct IssuerPeek {
    iss: String,
}

/// Read `iss` from the payload WITHOUT verifying anything.
///
/// The result is a registry lookup key and nothing more; it never leaves
/// this module.
fn peek_issuer(payload: &str) -> Result<String, TokenRejection> {
    let bytes = decode_segment(payload)?;
    let peek: IssuerPeek = serde_json::from_slice(&bytes).map_err(|e| {
        tracing::debug!(target: "pki.auth.jwt", error = %e, "Token payload has no string iss");
        TokenRejection::Malformed
    })?;
    Ok(peek.iss)
}

fn accepted_algorithm(alg: &str) -> Result<Algorithm, TokenRejection> {
    match Algorithm::from_str(alg) {
        Ok(algorithm) if ACCEPTED_ALGORITHMS.contains(&algorithm) => Ok(algorithm),
        _ => {
            tracing::debug!(
                target: "pki.auth.jwt",
                alg = %alg,
                "Token declares an unsupported algorithm"
            );
            Err(TokenRejection::UnsupportedAlgorithm)
        }
    }
}

/// Build the verification key, refusing any key the algorithm cannot use.
fn decoding_key_for(jwk: &Jwk, algorithm: Algorithm) -> Result<DecodingKey, TokenRejection> {
    if let Some(key_use) = jwk.key_use.as_deref() {
        if key_use != "sig" {
            tracing::warn!(
                target: "pki.auth.jwt",
                kid = ?jwk.kid,
                key_use = %key_use,
                "Key is not a signing key"
            );
            return Err(TokenRejection::UnsupportedKey);
        }
    }

    if let Some(key_alg) = jwk.alg.as_deref() {
        if Algorithm::from_str(key_alg).ok() != Some(algorithm) {
            tracing::debug!(
                target: "pki.auth.jwt",
                kid = ?jwk.kid,
                key_alg = %key_alg,
                token_alg = ?algorithm,
                "Token algorithm differs from key algorithm"
            );
            return Err(TokenRejection::AlgorithmMismatch);
        }
    }

    let key = match (jwk.kty.as_str(), algorithm) {
        (
            "RSA",
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512,
        ) => {
            let (n, e) = jwk
                .n
                .as_deref()
                .zip(jwk.e.as_deref())
                .ok_or(TokenRejection::UnsupportedKey)?;
            DecodingKey::from_rsa_components(n, e)
        }
        ("EC", Algorithm::ES256 | Algorithm::ES384) => {
            let curve = if algorithm == Algorithm::ES256 {
                "P-256"
            } else {
                "P-384"
            };
            if jwk.crv.as_deref() != Some(curve) {
                tracing::debug!(
                    target: "pki.auth.jwt",
                    kid = ?jwk.kid,
                    crv = ?jwk.crv,
                    "EC curve does not match algorithm"
                );
                return Err(TokenRejection::AlgorithmMismatch);
            }
            let (x, y) = jwk
                .x
                .as_deref()
                .zip(jwk.y.as_deref())
                .ok_or(TokenRejection::UnsupportedKey)?;
            DecodingKey::from_ec_components(x, y)
        }
        ("OKP", Algorithm::EdDSA) => {
            if jwk.crv.as_deref() != Some("Ed25519") {
                return Err(TokenRejection::UnsupportedKey);
            }
            let x = jwk.x.as_deref().ok_or(TokenRejection::UnsupportedKey)?;
            DecodingKey::from_ed_components(x)
        }
        ("RSA" | "EC" | "OKP", _) => {
            tracing::debug!(
                target: "pki.auth.jwt",
                kid = ?jwk.kid,
                kty = %jwk.kty,
                token_alg = ?algorithm,
                "Token algorithm incompatible with key type"
            );
            return Err(TokenRejection::AlgorithmMismatch);
        }
        _ => {
            tracing::warn!(
                target: "pki.auth.jwt",
                kid = ?jwk.kid,
                kty = %jwk.kty,
                "Unsupported key type"
            );
            return Err(TokenRejection::UnsupportedKey);
        }
    };

    key.map_err(|e| {
        tracing::warn!(target: "pki.auth.jwt", kid = ?jwk.kid, error = %e, "Invalid key material");
        TokenRejection::UnsupportedKey
    })
}

fn classify_jwt_error(kind: &ErrorKind) -> TokenRejection {
    match kind {
        ErrorKind::InvalidSignature => TokenRejection::InvalidSignature,
        ErrorKind::ExpiredSignature
        | ErrorKind::ImmatureSignature
        | ErrorKind::InvalidIssuer
        | ErrorKind::InvalidAudience
        | ErrorKind::MissingRequiredClaim(_) => TokenRejection::ClaimsRejected,
        ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
            TokenRejection::AlgorithmMismatch
        }
        ErrorKind::InvalidRsaKey(_) | ErrorKind::InvalidEcdsaKey | ErrorKind::InvalidKeyFormat => {
            TokenRejection::UnsupportedKey
        }
        ErrorKind::InvalidToken
        | ErrorKind::Base64(_)
        | ErrorKind::Json(_)
        | ErrorKind::Utf8(_) => TokenRejection::Malformed,
        _ => TokenRejection::InvalidSignature,
    }
}

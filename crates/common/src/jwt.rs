//! JWT utilities shared across PKI UI services.
//!
//! This module provides the structural, pre-verification half of JWT handling:
//! - Size limits for DoS prevention
//! - Clock skew constants for time-based claim validation
//! - Splitting a compact token into its three segments
//! - Decoding the JOSE header (`alg`, `kid`, `x5t`) without verifying anything
//! - iat validation logic
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Nothing returned from this module is trusted: a decoded header only
//!   selects the key and algorithm that the signature is later checked against
//! - Generic error messages prevent information leakage
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::{split_token, decode_header, validate_iat, DEFAULT_CLOCK_SKEW};
//!
//! let parts = split_token(token)?;
//! let header = decode_header(parts.header)?;
//! // look up a key with header.key_id() / header.thumbprint(), verify the signature,
//! // then:
//! validate_iat(claims_iat, DEFAULT_CLOCK_SKEW)?;
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// Typical RS256 access tokens are 800-1500 bytes; tokens above this size are
/// rejected BEFORE base64 decoding or signature verification.
pub const MAX_JWT_SIZE_BYTES: usize = 8192; // 8KB

/// Default JWT clock skew tolerance (5 minutes).
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(300);

/// Maximum allowed JWT clock skew tolerance (10 minutes).
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during structural JWT validation.
///
/// Note: Error messages are intentionally generic to prevent information leakage.
/// Detailed information is logged at debug level for troubleshooting.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds maximum allowed.
    #[error("The access token is invalid or expired")]
    TokenTooLarge,

    /// Token format is invalid (segment count, base64, or JSON).
    #[error("The access token is invalid or expired")]
    MalformedToken,

    /// Token `iat` claim is too far in the future.
    #[error("The access token is invalid or expired")]
    IatTooFarInFuture,
}

// =============================================================================
// Token structure
// =============================================================================

/// The three base64url segments of a compact JWS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenParts<'a> {
    pub header: &'a str,
    pub payload: &'a str,
    pub signature: &'a str,
}

/// Unverified JOSE header.
///
/// Only used to choose a verification key and algorithm.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TokenHeader {
    /// Token type, usually `JWT`.
    #[serde(default)]
    pub typ: Option<String>,

    /// Signing algorithm as declared by the token.
    pub alg: String,

    /// Key ID.
    #[serde(default)]
    pub kid: Option<String>,

    /// X.509 certificate SHA-1 thumbprint (base64url).
    #[serde(default)]
    pub x5t: Option<String>,
}

impl TokenHeader {
    /// Key ID, treating an empty string as absent.
    #[must_use]
    pub fn key_id(&self) -> Option<&str> {
        self.kid.as_deref().filter(|s| !s.is_empty())
    }

    /// Certificate thumbprint, treating an empty string as absent.
    #[must_use]
    pub fn thumbprint(&self) -> Option<&str> {
        self.x5t.as_deref().filter(|s| !s.is_empty())
    }
}

// =============================================================================
// Functions
// =============================================================================

/// Split a compact JWT into header, payload and signature segments.
///
/// # Errors
///
/// - `TokenTooLarge` - Token exceeds `MAX_JWT_SIZE_BYTES`
/// - `MalformedToken` - Token does not have exactly three dot-separated segments
pub fn split_token(token: &str) -> Result<TokenParts<'_>, JwtValidationError> {
    // Check token size first (DoS prevention)
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }

    let mut segments = token.split('.');
    match (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) {
        (Some(header), Some(payload), Some(signature), None) => Ok(TokenParts {
            header,
            payload,
            signature,
        }),
        _ => {
            tracing::debug!(
                target: "common.jwt",
                parts = token.split('.').count(),
                "Token rejected: invalid JWT format"
            );
            Err(JwtValidationError::MalformedToken)
        }
    }
}

/// Base64url-decode (no padding) a single token segment.
///
/// # Errors
///
/// Returns `MalformedToken` if the segment is not valid base64url.
pub fn decode_segment(segment: &str) -> Result<Vec<u8>, JwtValidationError> {
    URL_SAFE_NO_PAD.decode(segment).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT segment base64");
        JwtValidationError::MalformedToken
    })
}

/// Decode the header segment of a JWT without verifying the signature.
///
/// # Security
///
/// - This function does NOT validate the token signature
/// - The header MUST only be used to select a key from a trusted key set
///
/// # Errors
///
/// Returns `MalformedToken` if the segment is not base64url, is not JSON, or
/// lacks a string `alg`.
pub fn decode_header(segment: &str) -> Result<TokenHeader, JwtValidationError> {
    let header_bytes = decode_segment(segment)?;

    serde_json::from_slice(&header_bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT header JSON");
        JwtValidationError::MalformedToken
    })
}

/// Validate the `iat` (issued-at) claim with clock skew tolerance.
///
/// # Errors
///
/// Returns `JwtValidationError::IatTooFarInFuture` if the iat timestamp is more than
/// `clock_skew` in the future.
pub fn validate_iat(iat: i64, clock_skew: Duration) -> Result<(), JwtValidationError> {
    let now = chrono::Utc::now().timestamp();
    validate_iat_at(iat, clock_skew, now)
}

/// Deterministic `iat` validation against an explicit `now` timestamp.
pub(crate) fn validate_iat_at(
    iat: i64,
    clock_skew: Duration,
    now: i64,
) -> Result<(), JwtValidationError> {
    // Safe cast: clock_skew is bounded to MAX_CLOCK_SKEW (600 seconds), well within i64 range
    #[allow(clippy::cast_possible_wrap)]
    let clock_skew_secs = clock_skew.as_secs() as i64;
    let max_iat = now + clock_skew_secs;

    if iat > max_iat {
        tracing::debug!(
            target: "common.jwt",
            iat = iat,
            now = now,
            max_allowed = max_iat,
            clock_skew_secs = clock_skew_secs,
            "Token rejected: iat too far in the future"
        );
        return Err(JwtValidationError::IatTooFarInFuture);
    }

    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::cast_possible_wrap)]
mod tests {
    use super::*;

    fn token_with_header(header: &str) -> String {
        let header_b64 = URL_SAFE_NO_PAD.encode(header);
        format!("{header_b64}.payload.signature")
    }

    // -------------------------------------------------------------------------
    // split_token Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_split_token_three_segments() {
        let parts = split_token("aaa.bbb.ccc").unwrap();
        assert_eq!(parts.header, "aaa");
        assert_eq!(parts.payload, "bbb");
        assert_eq!(parts.signature, "ccc");
    }

    #[test]
    fn test_split_token_wrong_segment_counts() {
        for token in ["", "single", "only.two", "a.b.c.d", "a.b.c.d.e", "...."] {
            assert!(
                matches!(split_token(token), Err(JwtValidationError::MalformedToken)),
                "{token:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_split_token_allows_empty_segments() {
        // Structure only; content is checked by later steps
        let parts = split_token("..").unwrap();
        assert_eq!(parts.header, "");
        assert_eq!(parts.signature, "");
    }

    #[test]
    fn test_split_token_oversized() {
        let oversized = "a".repeat(MAX_JWT_SIZE_BYTES + 1);
        assert!(matches!(
            split_token(&oversized),
            Err(JwtValidationError::TokenTooLarge)
        ));
    }

    #[test]
    fn test_split_token_at_size_limit() {
        let remaining = MAX_JWT_SIZE_BYTES - 2;
        let token = format!(
            "{}.{}.{}",
            "h".repeat(remaining / 2),
            "p".repeat(remaining - remaining / 2 - 1),
            "s"
        );
        assert_eq!(token.len(), MAX_JWT_SIZE_BYTES);
        assert!(split_token(&token).is_ok());
    }

    // -------------------------------------------------------------------------
    // decode_header Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_decode_header_with_kid_and_x5t() {
        let token = token_with_header(r#"{"alg":"RS256","typ":"JWT","kid":"k1","x5t":"abc"}"#);
        let parts = split_token(&token).unwrap();
        let header = decode_header(parts.header).unwrap();

        assert_eq!(header.alg, "RS256");
        assert_eq!(header.typ.as_deref(), Some("JWT"));
        assert_eq!(header.key_id(), Some("k1"));
        assert_eq!(header.thumbprint(), Some("abc"));
    }

    #[test]
    fn test_decode_header_minimal() {
        let token = token_with_header(r#"{"alg":"EdDSA"}"#);
        let header = decode_header(split_token(&token).unwrap().header).unwrap();

        assert_eq!(header.alg, "EdDSA");
        assert!(header.typ.is_none());
        assert!(header.key_id().is_none());
        assert!(header.thumbprint().is_none());
    }

    #[test]
    fn test_decode_header_empty_identifiers_are_absent() {
        let token = token_with_header(r#"{"alg":"RS256","kid":"","x5t":""}"#);
        let header = decode_header(split_token(&token).unwrap().header).unwrap();

        assert!(header.key_id().is_none());
        assert!(header.thumbprint().is_none());
    }

    #[test]
    fn test_decode_header_missing_alg() {
        let token = token_with_header(r#"{"typ":"JWT","kid":"k1"}"#);
        let result = decode_header(split_token(&token).unwrap().header);
        assert!(matches!(result, Err(JwtValidationError::MalformedToken)));
    }

    #[test]
    fn test_decode_header_non_string_kid() {
        let token = token_with_header(r#"{"alg":"RS256","kid":12345}"#);
        let result = decode_header(split_token(&token).unwrap().header);
        assert!(matches!(result, Err(JwtValidationError::MalformedToken)));
    }

    #[test]
    fn test_decode_header_invalid_base64() {
        let result = decode_header("!!!invalid!!!");
        assert!(matches!(result, Err(JwtValidationError::MalformedToken)));
    }

    #[test]
    fn test_decode_header_invalid_json() {
        let result = decode_header(&URL_SAFE_NO_PAD.encode("not-json"));
        assert!(matches!(result, Err(JwtValidationError::MalformedToken)));
    }

    #[test]
    fn test_decode_segment_roundtrip_bytes() {
        let payload = br#"{"iss":"https://idp.example","sub":"alice"}"#;
        let decoded = decode_segment(&URL_SAFE_NO_PAD.encode(payload)).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_decode_segment_rejects_padding() {
        assert!(decode_segment("YQ==").is_err());
    }

    // -------------------------------------------------------------------------
    // validate_iat Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_validate_iat_current_time() {
        let now = chrono::Utc::now().timestamp();
        assert!(validate_iat(now, DEFAULT_CLOCK_SKEW).is_ok());
    }

    #[test]
    fn test_validate_iat_past_time() {
        let past = chrono::Utc::now().timestamp() - 3600;
        assert!(validate_iat(past, DEFAULT_CLOCK_SKEW).is_ok());
    }

    #[test]
    fn test_validate_iat_far_future() {
        let far_future = chrono::Utc::now().timestamp() + 86400;
        assert!(matches!(
            validate_iat(far_future, DEFAULT_CLOCK_SKEW),
            Err(JwtValidationError::IatTooFarInFuture)
        ));
    }

    #[test]
    fn test_validate_iat_at_boundary_exact() {
        let now = 1_700_000_000_i64;

        // iat == now + skew is the last accepted value
        assert!(validate_iat_at(now + 300, DEFAULT_CLOCK_SKEW, now).is_ok());

        // iat == now + skew + 1 is the first rejected value
        assert!(matches!(
            validate_iat_at(now + 301, DEFAULT_CLOCK_SKEW, now),
            Err(JwtValidationError::IatTooFarInFuture)
        ));
    }
}

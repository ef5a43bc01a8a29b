//! Current principal handler.
//!
//! Returns the verified claims of the caller's bearer token.

use crate::auth::VerifiedClaims;
use crate::middleware::Authenticated;
use axum::Json;
use serde::Serialize;
use serde_json::Value;
use tracing::instrument;

/// Response for `/api/v1/me` endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct MeResponse {
    /// Issuer whose key verified the token.
    pub issuer: String,

    /// Subject, when the token carries a string `sub`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// The full verified payload.
    pub claims: Value,
}

impl From<&VerifiedClaims> for MeResponse {
    fn from(claims: &VerifiedClaims) -> Self {
        Self {
            issuer: claims.issuer().to_string(),
            sub: claims.subject().map(str::to_string),
            claims: claims.json().clone(),
        }
    }
}

/// Handler for GET /api/v1/me
///
/// Requires verified claims; anonymous requests get 401.
///
/// ```json
/// {
///   "issuer": "https://idp.example",
///   "sub": "alice",
///   "claims": { "iss": "https://idp.example", "sub": "alice", "exp": 1234567890 }
/// }
/// ```
#[instrument(skip_all, name = "pki.handlers.me")]
pub async fn get_me(Authenticated(claims): Authenticated) -> Json<MeResponse> {
    tracing::debug!(
        target: "pki.handlers.me",
        issuer = %claims.issuer(),
        "Returning verified claims"
    );

    Json(MeResponse::from(&claims))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims(value: Value) -> VerifiedClaims {
        VerifiedClaims::new(
            "https://idp.example".to_string(),
            value.to_string(),
            value,
        )
    }

    #[test]
    fn test_me_response_serialization() {
        let response = MeResponse::from(&claims(json!({
            "iss": "https://idp.example",
            "sub": "alice",
            "exp": 1234567890,
        })));

        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["issuer"], "https://idp.example");
        assert_eq!(json["sub"], "alice");
        assert_eq!(json["claims"]["exp"], 1234567890);
    }

    #[test]
    fn test_me_response_without_subject() {
        let response = MeResponse::from(&claims(json!({ "iss": "https://idp.example" })));

        let json = serde_json::to_string(&response).unwrap();

        assert!(!json.contains("\"sub\""), "sub should be omitted when absent");
    }

    #[tokio::test]
    async fn test_get_me_returns_claims() {
        let Json(response) = get_me(Authenticated(claims(json!({ "sub": "bob" })))).await;

        assert_eq!(response.issuer, "https://idp.example");
        assert_eq!(response.sub.as_deref(), Some("bob"));
    }
}

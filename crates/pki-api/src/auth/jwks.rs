//! JSON Web Key Sets published by trusted issuers.
//!
//! Keys are fetched once per issuer during setup and held read-only for the
//! life of the process. A key is selected either by its key ID (`kid`) or,
//! failing that, by the SHA-1 thumbprint of its X.509 certificate (`x5t`).

use crate::auth::discovery::{fetch_document, FetchError};
use serde::Deserialize;
use std::collections::HashSet;
use tracing::instrument;
use url::Url;

/// JSON Web Key from a JWKS endpoint.
///
/// Only public-key members are modelled; anything else in the JWK is ignored.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Jwk {
    /// Key type ("RSA", "EC" or "OKP").
    pub kty: String,

    /// Key ID - used to select the correct key for verification.
    #[serde(default)]
    pub kid: Option<String>,

    /// X.509 certificate SHA-1 thumbprint (base64url).
    #[serde(default)]
    pub x5t: Option<String>,

    /// Algorithm this key is restricted to, if any.
    #[serde(default)]
    pub alg: Option<String>,

    /// Key use ("sig" for signing keys).
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,

    /// RSA modulus (base64url).
    #[serde(default)]
    pub n: Option<String>,

    /// RSA public exponent (base64url).
    #[serde(default)]
    pub e: Option<String>,

    /// Curve name for EC and OKP keys.
    #[serde(default)]
    pub crv: Option<String>,

    /// EC x coordinate or OKP public key (base64url).
    #[serde(default)]
    pub x: Option<String>,

    /// EC y coordinate (base64url).
    #[serde(default)]
    pub y: Option<String>,
}

/// JWKS document.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksResponse {
    /// List of JSON Web Keys.
    pub keys: Vec<Jwk>,
}

/// The signing keys of a single issuer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySet {
    keys: Vec<Jwk>,
}

impl KeySet {
    /// Build a key set. A repeated `kid` keeps the first key.
    pub fn new(keys: Vec<Jwk>) -> Self {
        let mut seen = HashSet::new();
        let keys = keys
            .into_iter()
            .filter(|key| match key.kid.as_deref() {
                Some(kid) if !seen.insert(kid.to_string()) => {
                    tracing::warn!(
                        target: "pki.auth.jwks",
                        kid = %kid,
                        "Duplicate kid in JWKS, keeping first"
                    );
                    false
                }
                _ => true,
            })
            .collect();

        Self { keys }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Jwk> {
        self.keys.iter()
    }

    /// Exact match on key ID.
    pub fn find_by_kid(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|key| key.kid.as_deref() == Some(kid))
    }

    /// Exact match on certificate thumbprint.
    pub fn find_by_thumbprint(&self, x5t: &str) -> Option<&Jwk> {
        self.keys.iter().find(|key| key.x5t.as_deref() == Some(x5t))
    }

    /// Select the verification key for a token header.
    ///
    /// Prefers the key ID; falls back to the thumbprint when the key ID is
    /// absent or unknown. `None` means the token cannot be verified.
    pub fn resolve(&self, kid: Option<&str>, x5t: Option<&str>) -> Option<&Jwk> {
        kid.and_then(|kid| self.find_by_kid(kid))
            .or_else(|| x5t.and_then(|x5t| self.find_by_thumbprint(x5t)))
    }
}

/// Fetch an issuer's key set from `url`.
///
/// # Errors
///
/// Any network, status, empty-body, size or parse failure.
#[instrument(skip_all, fields(url = %url))]
pub async fn fetch_key_set(client: &reqwest::Client, url: &Url) -> Result<KeySet, FetchError> {
    let jwks: JwksResponse = fetch_document(client, url).await?;
    let keys = KeySet::new(jwks.keys);

    tracing::info!(
        target: "pki.auth.jwks",
        key_count = keys.len(),
        "JWKS fetched"
    );

    Ok(keys)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn key(kid: Option<&str>, x5t: Option<&str>) -> Jwk {
        Jwk {
            kty: "RSA".to_string(),
            kid: kid.map(ToString::to_string),
            x5t: x5t.map(ToString::to_string),
            alg: None,
            key_use: None,
            n: Some("AQAB".to_string()),
            e: Some("AQAB".to_string()),
            crv: None,
            x: None,
            y: None,
        }
    }

    #[test]
    fn test_jwk_deserialization_rsa() {
        let json = r#"{
            "kty": "RSA",
            "kid": "k1",
            "use": "sig",
            "alg": "RS256",
            "n": "re4L2eef",
            "e": "AQAB",
            "x5t": "IlOF0oh4Z3LvPcx_e5IVu__prks",
            "x5c": ["MIIC..."]
        }"#;

        let jwk: Jwk = serde_json::from_str(json).unwrap();

        assert_eq!(jwk.kty, "RSA");
        assert_eq!(jwk.kid.as_deref(), Some("k1"));
        assert_eq!(jwk.key_use.as_deref(), Some("sig"));
        assert_eq!(jwk.alg.as_deref(), Some("RS256"));
        assert_eq!(jwk.x5t.as_deref(), Some("IlOF0oh4Z3LvPcx_e5IVu__prks"));
        assert!(jwk.crv.is_none());
    }

    #[test]
    fn test_jwk_deserialization_minimal() {
        let jwk: Jwk = serde_json::from_str(r#"{"kty": "OKP"}"#).unwrap();

        assert_eq!(jwk.kty, "OKP");
        assert!(jwk.kid.is_none());
        assert!(jwk.x5t.is_none());
        assert!(jwk.x.is_none());
    }

    #[test]
    fn test_jwks_response_requires_keys() {
        assert!(serde_json::from_str::<JwksResponse>(r#"{"foo": []}"#).is_err());
    }

    #[test]
    fn test_resolve_prefers_kid() {
        let keys = KeySet::new(vec![key(Some("k1"), Some("t1")), key(Some("k2"), Some("t2"))]);

        let found = keys.resolve(Some("k2"), Some("t1")).unwrap();
        assert_eq!(found.kid.as_deref(), Some("k2"));
    }

    #[test]
    fn test_resolve_falls_back_to_thumbprint() {
        let keys = KeySet::new(vec![key(Some("k1"), Some("t1")), key(None, Some("t2"))]);

        // Unknown kid
        let found = keys.resolve(Some("rotated-away"), Some("t2")).unwrap();
        assert_eq!(found.x5t.as_deref(), Some("t2"));

        // No kid at all
        let found = keys.resolve(None, Some("t1")).unwrap();
        assert_eq!(found.kid.as_deref(), Some("k1"));
    }

    #[test]
    fn test_resolve_no_match_is_none() {
        let keys = KeySet::new(vec![key(Some("k1"), Some("t1"))]);

        assert!(keys.resolve(Some("k9"), Some("t9")).is_none());
        assert!(keys.resolve(Some("k9"), None).is_none());
        assert!(keys.resolve(None, None).is_none());
    }

    #[test]
    fn test_resolve_on_empty_set_is_none() {
        let keys = KeySet::default();

        assert!(keys.is_empty());
        assert!(keys.resolve(Some("k1"), Some("t1")).is_none());
    }

    #[test]
    fn test_duplicate_kid_keeps_first() {
        let keys = KeySet::new(vec![
            key(Some("k1"), Some("first")),
            key(Some("k1"), Some("second")),
            key(None, Some("a")),
            key(None, Some("b")),
        ]);

        assert_eq!(keys.len(), 3);
        assert_eq!(
            keys.find_by_kid("k1").unwrap().x5t.as_deref(),
            Some("first")
        );
    }

    #[tokio::test]
    async fn test_fetch_key_set_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "keys": [
                    {"kty": "RSA", "kid": "k1", "n": "AQAB", "e": "AQAB"},
                    {"kty": "OKP", "kid": "k2", "crv": "Ed25519", "x": "AAAA"}
                ]
            })))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/jwks", server.uri())).unwrap();
        let keys = fetch_key_set(&reqwest::Client::new(), &url).await.unwrap();

        assert_eq!(keys.len(), 2);
        assert!(keys.find_by_kid("k2").is_some());
    }

    #[tokio::test]
    async fn test_fetch_key_set_empty_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/jwks", server.uri())).unwrap();
        let err = fetch_key_set(&reqwest::Client::new(), &url)
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::EmptyBody { .. }));
    }

    #[tokio::test]
    async fn test_fetch_key_set_not_found() {
        let server = MockServer::start().await;

        let url = Url::parse(&format!("{}/jwks", server.uri())).unwrap();
        let err = fetch_key_set(&reqwest::Client::new(), &url)
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Status { status: 404, .. }));
    }
}

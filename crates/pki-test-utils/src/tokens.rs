//! Builders for test tokens.
//!
//! Provides a fluent API for minting signed tokens plus helpers that damage a
//! token in one specific way.

use crate::keys::{Ed25519TestKey, RsaTestKey};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Map, Value};

/// Builder for signed test tokens.
///
/// Defaults: `sub = "test-subject"`, issued now, expires in one hour. The `kid`
/// header defaults to the signing key's ID unless overridden or omitted.
///
/// # Example
/// ```rust,ignore
/// let token = TestTokenBuilder::new("https://idp.example")
///     .for_subject("alice")
///     .with_claim("roles", json!(["admin"]))
///     .sign_rsa(&RsaTestKey::primary("k1"));
/// ```
#[derive(Debug, Clone)]
pub struct TestTokenBuilder {
    claims: Map<String, Value>,
    algorithm: Option<Algorithm>,
    kid: Option<String>,
    omit_kid: bool,
    x5t: Option<String>,
}

impl TestTokenBuilder {
    pub fn new(issuer: &str) -> Self {
        let now = Utc::now();
        let mut claims = Map::new();
        claims.insert("iss".to_string(), json!(issuer));
        claims.insert("sub".to_string(), json!("test-subject"));
        claims.insert("iat".to_string(), json!(now.timestamp()));
        claims.insert(
            "exp".to_string(),
            json!((now + Duration::seconds(3600)).timestamp()),
        );

        Self {
            claims,
            algorithm: None,
            kid: None,
            omit_kid: false,
            x5t: None,
        }
    }

    pub fn for_subject(self, subject: &str) -> Self {
        self.with_claim("sub", json!(subject))
    }

    pub fn with_claim(mut self, name: &str, value: Value) -> Self {
        self.claims.insert(name.to_string(), value);
        self
    }

    pub fn without_claim(mut self, name: &str) -> Self {
        self.claims.remove(name);
        self
    }

    /// Set expiration in seconds from now (negative for already expired).
    pub fn expires_in(self, seconds: i64) -> Self {
        let exp = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self.with_claim("exp", json!(exp))
    }

    pub fn issued_at(self, timestamp: i64) -> Self {
        self.with_claim("iat", json!(timestamp))
    }

    pub fn not_before(self, timestamp: i64) -> Self {
        self.with_claim("nbf", json!(timestamp))
    }

    /// Override the header algorithm.
    pub fn algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = Some(algorithm);
        self
    }

    /// Override the header `kid`.
    pub fn with_kid(mut self, kid: &str) -> Self {
        self.kid = Some(kid.to_string());
        self.omit_kid = false;
        self
    }

    /// Send no `kid` header at all.
    pub fn without_kid(mut self) -> Self {
        self.kid = None;
        self.omit_kid = true;
        self
    }

    pub fn with_thumbprint(mut self, x5t: &str) -> Self {
        self.x5t = Some(x5t.to_string());
        self
    }

    /// The claim set as it will be encoded.
    pub fn claims(&self) -> Value {
        Value::Object(self.claims.clone())
    }

    /// Sign with an RSA fixture key; `RS256` unless overridden.
    pub fn sign_rsa(self, key: &RsaTestKey) -> String {
        self.sign_with(key.kid(), Algorithm::RS256, &key.encoding_key())
    }

    /// Sign with an Ed25519 key; `EdDSA` unless overridden.
    pub fn sign_ed25519(self, key: &Ed25519TestKey) -> String {
        self.sign_with(key.kid(), Algorithm::EdDSA, &key.encoding_key())
    }

    /// Sign with an arbitrary key. The algorithm must have been set.
    pub fn sign(self, key: &EncodingKey) -> String {
        let algorithm = self
            .algorithm
            .expect("algorithm must be set when signing with a raw key");
        let header = self.header(algorithm, None);
        encode(&header, &self.claims, key).expect("token should encode")
    }

    fn sign_with(self, default_kid: &str, default_alg: Algorithm, key: &EncodingKey) -> String {
        let algorithm = self.algorithm.unwrap_or(default_alg);
        let header = self.header(algorithm, Some(default_kid));
        encode(&header, &self.claims, key).expect("token should encode")
    }

    fn header(&self, algorithm: Algorithm, default_kid: Option<&str>) -> Header {
        let mut header = Header::new(algorithm);
        header.kid = if self.omit_kid {
            None
        } else {
            self.kid
                .clone()
                .or_else(|| default_kid.map(ToString::to_string))
        };
        header.x5t = self.x5t.clone();
        header
    }
}

/// Flip one bit in the first byte of the signature.
pub fn tamper_signature(token: &str) -> String {
    let (header, payload, signature) = split(token);
    let mut bytes = URL_SAFE_NO_PAD
        .decode(signature)
        .expect("signature should be base64url");
    bytes[0] ^= 0x01;
    format!("{header}.{payload}.{}", URL_SAFE_NO_PAD.encode(bytes))
}

/// Replace the header segment, keeping payload and signature.
pub fn replace_header(token: &str, header: &Value) -> String {
    let (_, payload, signature) = split(token);
    format!("{}.{payload}.{signature}", encode_json(header))
}

/// A structurally valid token with a meaningless signature.
pub fn unsigned_token(header: &Value, claims: &Value) -> String {
    format!(
        "{}.{}.{}",
        encode_json(header),
        encode_json(claims),
        URL_SAFE_NO_PAD.encode(b"not-a-signature")
    )
}

/// The decoded payload segment.
pub fn payload_bytes(token: &str) -> Vec<u8> {
    let (_, payload, _) = split(token);
    URL_SAFE_NO_PAD
        .decode(payload)
        .expect("payload should be base64url")
}

fn encode_json(value: &Value) -> String {
    URL_SAFE_NO_PAD.encode(serde_json::to_vec(value).expect("JSON should serialize"))
}

fn split(token: &str) -> (&str, &str, &str) {
    let mut parts = token.splitn(3, '.');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(h), Some(p), Some(s)) => (h, p, s),
        _ => panic!("test token should have three segments: {token}"),
    }
}

//! Mock OpenID Connect issuer.
//!
//! Serves a discovery document at `/.well-known/openid-configuration` and a
//! JWKS at `/jwks`. The issuer identifier is the server's base URL unless a
//! different one is advertised on purpose.

use crate::keys::jwks;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const DISCOVERY_PATH: &str = "/.well-known/openid-configuration";
pub const JWKS_PATH: &str = "/jwks";

/// A wiremock server acting as a token issuer.
///
/// # Example
/// ```rust,ignore
/// let key = RsaTestKey::primary("k1");
/// let issuer = MockIssuer::start(vec![key.jwk()]).await;
/// // configure AUTH_ISSUERS=issuer.issuer()
/// ```
pub struct MockIssuer {
    server: MockServer,
    advertised_issuer: String,
}

impl MockIssuer {
    /// Start an issuer publishing `keys`.
    pub async fn start(keys: Vec<Value>) -> Self {
        let server = MockServer::start().await;
        let issuer = server.uri();
        Self::mount(server, issuer, keys).await
    }

    /// Start an issuer whose discovery document names `advertised_issuer`
    /// instead of its own URL.
    pub async fn start_advertising(advertised_issuer: &str, keys: Vec<Value>) -> Self {
        let server = MockServer::start().await;
        Self::mount(server, advertised_issuer.to_string(), keys).await
    }

    /// Start an issuer whose discovery endpoint answers with `status` and no body.
    pub async fn start_failing(status: u16) -> Self {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(DISCOVERY_PATH))
            .respond_with(ResponseTemplate::new(status))
            .mount(&server)
            .await;
        let advertised_issuer = server.uri();
        Self {
            server,
            advertised_issuer,
        }
    }

    async fn mount(server: MockServer, advertised_issuer: String, keys: Vec<Value>) -> Self {
        Mock::given(method("GET"))
            .and(path(DISCOVERY_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issuer": advertised_issuer,
                "jwks_uri": format!("{}{JWKS_PATH}", server.uri()),
                "id_token_signing_alg_values_supported": ["RS256", "EdDSA"],
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks(&keys)))
            .mount(&server)
            .await;

        Self {
            server,
            advertised_issuer,
        }
    }

    /// Base URL of the server, which is also the issuer identifier for
    /// issuers started with [`MockIssuer::start`].
    pub fn issuer(&self) -> String {
        self.server.uri()
    }

    /// Issuer named in the discovery document.
    pub fn advertised_issuer(&self) -> &str {
        &self.advertised_issuer
    }

    pub fn discovery_url(&self) -> String {
        format!("{}{DISCOVERY_PATH}", self.server.uri())
    }

    pub fn server(&self) -> &MockServer {
        &self.server
    }
}

//! OpenID Connect discovery for trusted token issuers.
//!
//! Each trusted issuer publishes a discovery document at
//! `<issuer>/.well-known/openid-configuration`. The document names the issuer
//! identifier and the `jwks_uri` where the signing keys live.
//!
//! # Security
//!
//! - Only HTTPS issuer URLs are accepted unless insecure issuers are explicitly allowed
//! - The `issuer` in the discovery document must match the configured issuer
//! - A `jwks_uri` may not downgrade an HTTPS issuer to plain HTTP
//! - Every fetch is bounded by the HTTP client timeout and a response size cap

use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;
use url::Url;

/// Path of the discovery document relative to the issuer identifier.
pub const WELL_KNOWN_PATH: &str = "/.well-known/openid-configuration";

/// Upper bound for a discovery document or key set body (1 MiB).
pub const MAX_DOCUMENT_BYTES: usize = 1024 * 1024;

/// Default timeout for outbound issuer requests.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors raised while fetching issuer key material during setup.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("{url} returned an empty body")]
    EmptyBody { url: String },

    #[error("{url} returned a body larger than 1 MiB")]
    TooLarge { url: String },

    #[error("Failed to parse response from {url}: {message}")]
    Parse { url: String, message: String },

    #[error("Issuer mismatch: expected {expected}, got {actual}")]
    IssuerMismatch { expected: String, actual: String },
}

impl FetchError {
    /// Bounded label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::InvalidUrl(_) => "invalid_url",
            FetchError::Request { .. } => "request",
            FetchError::Status { .. } => "status",
            FetchError::EmptyBody { .. } => "empty_body",
            FetchError::TooLarge { .. } => "too_large",
            FetchError::Parse { .. } => "parse",
            FetchError::IssuerMismatch { .. } => "issuer_mismatch",
        }
    }
}

/// Errors raised while parsing a configured issuer entry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IssuerSourceError {
    #[error("'{0}' is not an absolute URL")]
    InvalidUrl(String),

    #[error("'{0}' must use https")]
    InsecureScheme(String),

    #[error("'{0}' must not carry a query or fragment")]
    QueryOrFragment(String),
}

/// A configured issuer: the identifier tokens must carry in `iss` and the
/// discovery URL its metadata is fetched from.
#[derive(Clone, PartialEq, Eq)]
pub struct IssuerSource {
    issuer: String,
    discovery_url: Url,
}

impl IssuerSource {
    /// Parse a configured entry.
    ///
    /// Accepts either the issuer identifier (`https://idp.example`) or the full
    /// discovery URL (`https://idp.example/.well-known/openid-configuration`).
    ///
    /// # Errors
    ///
    /// Returns `IssuerSourceError` if the entry is not an absolute http(s) URL,
    /// uses plain http without `allow_insecure`, or has a query/fragment.
    pub fn parse(raw: &str, allow_insecure: bool) -> Result<Self, IssuerSourceError> {
        let raw = raw.trim();
        let url = Url::parse(raw).map_err(|_| IssuerSourceError::InvalidUrl(raw.to_string()))?;

        match url.scheme() {
            "https" => {}
            "http" if allow_insecure => {}
            "http" => return Err(IssuerSourceError::InsecureScheme(raw.to_string())),
            _ => return Err(IssuerSourceError::InvalidUrl(raw.to_string())),
        }

        if url.query().is_some() || url.fragment().is_some() {
            return Err(IssuerSourceError::QueryOrFragment(raw.to_string()));
        }

        // The identifier is kept as written; only the discovery URL is derived
        let base = raw.trim_end_matches('/');
        if let Some(issuer) = base.strip_suffix(WELL_KNOWN_PATH) {
            return Ok(Self {
                issuer: issuer.to_string(),
                discovery_url: url,
            });
        }

        let discovery_url = Url::parse(&format!("{base}{WELL_KNOWN_PATH}"))
            .map_err(|_| IssuerSourceError::InvalidUrl(raw.to_string()))?;

        Ok(Self {
            issuer: raw.to_string(),
            discovery_url,
        })
    }

    /// Expected issuer identifier, exactly as configured.
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Where the discovery document is fetched from.
    pub fn discovery_url(&self) -> &Url {
        &self.discovery_url
    }

    /// Whether `actual` is exactly the configured identifier.
    pub fn matches_issuer(&self, actual: &str) -> bool {
        self.issuer == actual
    }
}

impl fmt::Debug for IssuerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuerSource")
            .field("issuer", &self.issuer)
            .field("discovery_url", &self.discovery_url.as_str())
            .finish()
    }
}

/// Issuer metadata from the discovery document.
///
/// Only `issuer` and `jwks_uri` are required; the rest is informational.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct DiscoveryMetadata {
    /// Issuer identifier; must equal the `iss` claim of tokens from this issuer.
    pub issuer: String,

    /// URL of the issuer's JSON Web Key Set.
    pub jwks_uri: String,

    #[serde(default)]
    pub authorization_endpoint: Option<String>,

    #[serde(default)]
    pub token_endpoint: Option<String>,

    #[serde(default)]
    pub userinfo_endpoint: Option<String>,

    #[serde(default)]
    pub id_token_signing_alg_values_supported: Vec<String>,
}

/// Build the HTTP client used for all issuer fetches.
///
/// # Errors
///
/// Returns the underlying `reqwest::Error` if the TLS backend cannot be initialised.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .build()
}

/// Fetch and parse an issuer's discovery document.
///
/// # Errors
///
/// Any network, status, empty-body, size or parse failure.
#[instrument(skip_all, fields(url = %url))]
pub async fn fetch_metadata(
    client: &reqwest::Client,
    url: &Url,
) -> Result<DiscoveryMetadata, FetchError> {
    let metadata: DiscoveryMetadata = fetch_document(client, url).await?;

    tracing::debug!(
        target: "pki.auth.discovery",
        issuer = %metadata.issuer,
        jwks_uri = %metadata.jwks_uri,
        "Discovery document fetched"
    );

    Ok(metadata)
}

/// Resolve the `jwks_uri` advertised in `metadata` against the discovery URL.
///
/// # Errors
///
/// Returns `FetchError::InvalidUrl` if the URI does not parse, is not http(s),
/// or downgrades an https discovery URL to http.
pub fn jwks_url(discovery_url: &Url, metadata: &DiscoveryMetadata) -> Result<Url, FetchError> {
    let url = discovery_url
        .join(&metadata.jwks_uri)
        .map_err(|_| FetchError::InvalidUrl(metadata.jwks_uri.clone()))?;

    match (discovery_url.scheme(), url.scheme()) {
        ("https", "https") | ("http", "https" | "http") => Ok(url),
        _ => {
            tracing::warn!(
                target: "pki.auth.discovery",
                jwks_uri = %metadata.jwks_uri,
                "Rejected jwks_uri with unexpected scheme"
            );
            Err(FetchError::InvalidUrl(metadata.jwks_uri.clone()))
        }
    }
}

/// GET `url` and deserialize the complete JSON body.
///
/// The body is read to completion before parsing; a zero-length body is
/// reported as `EmptyBody` rather than a parse error.
pub(crate) async fn fetch_document<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &Url,
) -> Result<T, FetchError> {
    let response = client.get(url.clone()).send().await.map_err(|e| {
        tracing::error!(
            target: "pki.auth.discovery",
            url = %url,
            error = %e,
            "Issuer request failed"
        );
        FetchError::Request {
            url: url.to_string(),
            message: e.to_string(),
        }
    })?;

    let status = response.status();
    if !status.is_success() {
        tracing::error!(
            target: "pki.auth.discovery",
            url = %url,
            status = %status,
            "Issuer endpoint returned error"
        );
        return Err(FetchError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    if response
        .content_length()
        .is_some_and(|len| len > MAX_DOCUMENT_BYTES as u64)
    {
        return Err(FetchError::TooLarge {
            url: url.to_string(),
        });
    }

    let body = read_body_bounded(response, url).await?;

    if body.is_empty() {
        tracing::error!(
            target: "pki.auth.discovery",
            url = %url,
            "Issuer endpoint returned an empty body"
        );
        return Err(FetchError::EmptyBody {
            url: url.to_string(),
        });
    }

    serde_json::from_slice(&body).map_err(|e| {
        tracing::error!(
            target: "pki.auth.discovery",
            url = %url,
            error = %e,
            "Failed to parse issuer response"
        );
        FetchError::Parse {
            url: url.to_string(),
            message: e.to_string(),
        }
    })
}

/// Read the body chunk by chunk, giving up as soon as it exceeds `MAX_DOCUMENT_BYTES`.
///
/// A response without `Content-Length` is never buffered past the limit.
async fn read_body_bounded(
    mut response: reqwest::Response,
    url: &Url,
) -> Result<Vec<u8>, FetchError> {
    let mut body = Vec::new();

    loop {
        let chunk = response.chunk().await.map_err(|e| {
            tracing::error!(
                target: "pki.auth.discovery",
                url = %url,
                error = %e,
                "Failed to read issuer response body"
            );
            FetchError::Request {
                url: url.to_string(),
                message: e.to_string(),
            }
        })?;

        let Some(chunk) = chunk else {
            return Ok(body);
        };

        if body.len() + chunk.len() > MAX_DOCUMENT_BYTES {
            tracing::error!(
                target: "pki.auth.discovery",
                url = %url,
                "Issuer response exceeds size limit"
            );
            return Err(FetchError::TooLarge {
                url: url.to_string(),
            });
        }
        body.extend_from_slice(&chunk);
    }
}

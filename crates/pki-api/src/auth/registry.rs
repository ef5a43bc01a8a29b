//! Registry of trusted token issuers.
//!
//! Issuers are collected from configuration into [`PendingIssuers`], then
//! [`PendingIssuers::setup`] fetches every issuer's discovery document and key
//! set and freezes the survivors into an [`IssuerRegistry`]. Only the frozen
//! registry supports lookup, so a lookup before setup cannot be expressed.
//!
//! The registry is immutable once built. Replacing key material means building
//! a new registry and swapping the `Arc` that holds it.

use crate::auth::discovery::{
    fetch_metadata, jwks_url, DiscoveryMetadata, FetchError, IssuerSource,
};
use crate::auth::jwks::{fetch_key_set, KeySet};
use crate::observability::metrics;
use futures::future::join_all;
use std::time::Instant;
use tracing::instrument;
use url::Url;

/// A trusted issuer whose metadata and keys have been fetched.
#[derive(Debug, Clone)]
pub struct Issuer {
    identifier: String,
    discovery_url: Url,
    metadata: DiscoveryMetadata,
    keys: KeySet,
}

impl Issuer {
    /// Assemble an issuer from fetched material.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::IssuerMismatch` if the discovery document names a
    /// different issuer than the one configured.
    pub fn new(
        source: &IssuerSource,
        metadata: DiscoveryMetadata,
        keys: KeySet,
    ) -> Result<Self, FetchError> {
        if !source.matches_issuer(&metadata.issuer) {
            return Err(FetchError::IssuerMismatch {
                expected: source.issuer().to_string(),
                actual: metadata.issuer,
            });
        }

        Ok(Self {
            identifier: metadata.issuer.clone(),
            discovery_url: source.discovery_url().clone(),
            metadata,
            keys,
        })
    }

    /// Issuer identifier, exactly as published in the discovery document.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn discovery_url(&self) -> &Url {
        &self.discovery_url
    }

    pub fn metadata(&self) -> &DiscoveryMetadata {
        &self.metadata
    }

    pub fn keys(&self) -> &KeySet {
        &self.keys
    }
}

/// An issuer that could not be set up. It is excluded from the registry.
#[derive(Debug)]
pub struct IssuerSetupFailure {
    pub source: IssuerSource,
    pub error: FetchError,
}

/// Issuers registered from configuration, not yet fetched.
#[derive(Debug, Clone, Default)]
pub struct PendingIssuers {
    sources: Vec<IssuerSource>,
}

impl PendingIssuers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an issuer. Registering the same source twice is a no-op.
    pub fn add(&mut self, source: IssuerSource) {
        if self.sources.contains(&source) {
            tracing::debug!(
                target: "pki.auth.registry",
                issuer = %source.issuer(),
                "Issuer already registered"
            );
            return;
        }
        self.sources.push(source);
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Fetch every pending issuer concurrently and freeze the result.
    ///
    /// Each fetch is bounded by the client's timeout. Issuers that fail are
    /// returned alongside the registry and are never selectable for lookup.
    #[instrument(skip_all, fields(issuers = self.sources.len()))]
    pub async fn setup(
        self,
        client: &reqwest::Client,
    ) -> (IssuerRegistry, Vec<IssuerSetupFailure>) {
        let results = join_all(
            self.sources
                .into_iter()
                .map(|source| async move {
                    let start = Instant::now();
                    let result = setup_one(client, &source).await;
                    let status = if result.is_ok() { "success" } else { "error" };
                    metrics::record_issuer_setup(status, start.elapsed());
                    (source, result)
                }),
        )
        .await;

        let mut issuers = Vec::with_capacity(results.len());
        let mut failures = Vec::new();

        for (source, result) in results {
            match result {
                Ok(issuer) => {
                    tracing::info!(
                        target: "pki.auth.registry",
                        issuer = %issuer.identifier(),
                        keys = issuer.keys().len(),
                        "Issuer ready"
                    );
                    issuers.push(issuer);
                }
                Err(error) => {
                    tracing::error!(
                        target: "pki.auth.registry",
                        issuer = %source.issuer(),
                        error = %error,
                        error_type = error.kind(),
                        "Issuer setup failed, excluding from registry"
                    );
                    failures.push(IssuerSetupFailure { source, error });
                }
            }
        }

        let registry = IssuerRegistry::from_issuers(issuers);
        metrics::set_registry_issuers(registry.len());

        (registry, failures)
    }
}

/// Discovery, then key set, then the issuer identity check.
async fn setup_one(client: &reqwest::Client, source: &IssuerSource) -> Result<Issuer, FetchError> {
    let metadata = fetch_metadata(client, source.discovery_url()).await?;
    let url = jwks_url(source.discovery_url(), &metadata)?;
    let keys = fetch_key_set(client, &url).await?;

    if keys.is_empty() {
        tracing::warn!(
            target: "pki.auth.registry",
            issuer = %metadata.issuer,
            "Issuer published an empty key set"
        );
    }

    Issuer::new(source, metadata, keys)
}

/// Frozen, lookup-ready set of issuers ordered by identifier.
#[derive(Debug, Clone, Default)]
pub struct IssuerRegistry {
    issuers: Vec<Issuer>,
}

impl IssuerRegistry {
    /// Order issuers by identifier. A repeated identifier keeps the first issuer.
    pub fn from_issuers(mut issuers: Vec<Issuer>) -> Self {
        issuers.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        issuers.dedup_by(|later, earlier| {
            let duplicate = later.identifier == earlier.identifier;
            if duplicate {
                tracing::warn!(
                    target: "pki.auth.registry",
                    issuer = %later.identifier,
                    "Duplicate issuer identifier, keeping first"
                );
            }
            duplicate
        });

        Self { issuers }
    }

    /// Registry with no issuers; every lookup misses.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Binary search by exact issuer identifier.
    pub fn find(&self, identifier: &str) -> Option<&Issuer> {
        self.issuers
            .binary_search_by(|issuer| issuer.identifier.as_str().cmp(identifier))
            .ok()
            .and_then(|index| self.issuers.get(index))
    }

    pub fn len(&self) -> usize {
        self.issuers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issuers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Issuer> {
        self.issuers.iter()
    }

    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.issuers.iter().map(Issuer::identifier)
    }
}

/// An issuer holding the JWKs in `keys`, built without any network access.
#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) fn test_issuer(identifier: &str, keys: &[serde_json::Value]) -> Issuer {
    let source = IssuerSource::parse(identifier, false).unwrap();
    let metadata: DiscoveryMetadata = serde_json::from_value(serde_json::json!({
        "issuer": identifier,
        "jwks_uri": format!("{identifier}/jwks"),
    }))
    .unwrap();
    let jwks: crate::auth::jwks::JwksResponse =
        serde_json::from_value(serde_json::json!({ "keys": keys })).unwrap();
    Issuer::new(&source, metadata, KeySet::new(jwks.keys)).unwrap()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::discovery::WELL_KNOWN_PATH;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn metadata(issuer: &str) -> DiscoveryMetadata {
        DiscoveryMetadata {
            issuer: issuer.to_string(),
            jwks_uri: format!("{issuer}/jwks"),
            authorization_endpoint: None,
            token_endpoint: None,
            userinfo_endpoint: None,
            id_token_signing_alg_values_supported: Vec::new(),
        }
    }

    fn issuer(identifier: &str) -> Issuer {
        let source = IssuerSource::parse(identifier, false).unwrap();
        Issuer::new(&source, metadata(identifier), KeySet::default()).unwrap()
    }

    async fn mount_issuer(server: &MockServer, advertised_issuer: &str) {
        Mock::given(method("GET"))
            .and(path(WELL_KNOWN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "issuer": advertised_issuer,
                "jwks_uri": format!("{}/jwks", server.uri()),
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "keys": [{"kty": "RSA", "kid": "k1", "n": "AQAB", "e": "AQAB"}]
            })))
            .mount(server)
            .await;
    }

    #[test]
    fn test_issuer_new_rejects_mismatch() {
        let source = IssuerSource::parse("https://idp.example", false).unwrap();
        let err = Issuer::new(&source, metadata("https://evil.example"), KeySet::default())
            .unwrap_err();

        assert!(matches!(err, FetchError::IssuerMismatch { .. }));
    }

    #[test]
    fn test_issuer_new_requires_exact_identifier() {
        let source = IssuerSource::parse("https://idp.example", false).unwrap();
        let err = Issuer::new(&source, metadata("https://idp.example/"), KeySet::default())
            .unwrap_err();
        assert!(matches!(err, FetchError::IssuerMismatch { .. }));

        let source = IssuerSource::parse("https://idp.example/", false).unwrap();
        let issuer = Issuer::new(&source, metadata("https://idp.example/"), KeySet::default())
            .unwrap();
        assert_eq!(issuer.identifier(), "https://idp.example/");
    }

    #[test]
    fn test_find_each_issuer() {
        let names = [
            "https://c.example",
            "https://a.example",
            "https://e.example",
            "https://b.example",
            "https://d.example",
        ];
        let registry = IssuerRegistry::from_issuers(names.iter().map(|n| issuer(n)).collect());

        for name in names {
            assert_eq!(registry.find(name).unwrap().identifier(), name);
        }
    }

    #[test]
    fn test_registry_is_sorted() {
        let registry = IssuerRegistry::from_issuers(vec![
            issuer("https://z.example"),
            issuer("https://m.example"),
            issuer("https://a.example"),
        ]);

        let ids: Vec<&str> = registry.identifiers().collect();
        assert_eq!(
            ids,
            vec!["https://a.example", "https://m.example", "https://z.example"]
        );
    }

    #[test]
    fn test_find_other_strings_not_found() {
        let registry = IssuerRegistry::from_issuers(vec![
            issuer("https://a.example"),
            issuer("https://b.example"),
        ]);

        for missing in [
            "",
            "https://a.example/",
            "https://A.example",
            "https://aa.example",
            "https://c.example",
            "a.example",
        ] {
            assert!(registry.find(missing).is_none(), "{missing:?} should miss");
        }
    }

    #[test]
    fn test_empty_registry_never_finds() {
        let registry = IssuerRegistry::empty();

        assert!(registry.is_empty());
        assert!(registry.find("https://idp.example").is_none());
        assert!(registry.find("").is_none());
    }

    #[test]
    fn test_duplicate_identifier_keeps_first() {
        let source = IssuerSource::parse("https://idp.example", false).unwrap();
        let mut second = metadata("https://idp.example");
        second.token_endpoint = Some("https://idp.example/second".to_string());

        let registry = IssuerRegistry::from_issuers(vec![
            Issuer::new(&source, metadata("https://idp.example"), KeySet::default()).unwrap(),
            Issuer::new(&source, second, KeySet::default()).unwrap(),
        ]);

        assert_eq!(registry.len(), 1);
        assert!(registry
            .find("https://idp.example")
            .unwrap()
            .metadata()
            .token_endpoint
            .is_none());
    }

    #[test]
    fn test_pending_add_collapses_duplicates() {
        let mut pending = PendingIssuers::new();
        pending.add(IssuerSource::parse("https://idp.example", false).unwrap());
        pending.add(IssuerSource::parse("https://idp.example/", false).unwrap());
        pending.add(IssuerSource::parse("https://other.example", false).unwrap());

        assert_eq!(pending.len(), 2);
    }

    #[tokio::test]
    async fn test_setup_with_no_issuers() {
        let (registry, failures) = PendingIssuers::new().setup(&reqwest::Client::new()).await;

        assert!(registry.is_empty());
        assert!(failures.is_empty());
    }

    #[tokio::test]
    async fn test_setup_registers_working_issuers() {
        let server_a = MockServer::start().await;
        let server_b = MockServer::start().await;
        mount_issuer(&server_a, &server_a.uri()).await;
        mount_issuer(&server_b, &server_b.uri()).await;

        let mut pending = PendingIssuers::new();
        pending.add(IssuerSource::parse(&server_a.uri(), true).unwrap());
        pending.add(IssuerSource::parse(&server_b.uri(), true).unwrap());

        let (registry, failures) = pending.setup(&reqwest::Client::new()).await;

        assert!(failures.is_empty());
        assert_eq!(registry.len(), 2);
        let issuer = registry.find(&server_a.uri()).unwrap();
        assert!(issuer.keys().find_by_kid("k1").is_some());
        assert!(registry.find(&server_b.uri()).is_some());
    }

    #[tokio::test]
    async fn test_setup_excludes_failed_issuer() {
        let good = MockServer::start().await;
        let broken = MockServer::start().await;
        mount_issuer(&good, &good.uri()).await;
        Mock::given(method("GET"))
            .and(path(WELL_KNOWN_PATH))
            .respond_with(ResponseTemplate::new(500))
            .mount(&broken)
            .await;

        let mut pending = PendingIssuers::new();
        pending.add(IssuerSource::parse(&good.uri(), true).unwrap());
        pending.add(IssuerSource::parse(&broken.uri(), true).unwrap());

        let (registry, failures) = pending.setup(&reqwest::Client::new()).await;

        assert_eq!(registry.len(), 1);
        assert!(registry.find(&good.uri()).is_some());
        assert!(registry.find(&broken.uri()).is_none());

        assert_eq!(failures.len(), 1);
        let failure = failures.first().unwrap();
        assert_eq!(failure.source.issuer(), broken.uri());
        assert!(matches!(failure.error, FetchError::Status { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_setup_excludes_mismatched_issuer() {
        let server = MockServer::start().await;
        mount_issuer(&server, "https://someone-else.example").await;

        let mut pending = PendingIssuers::new();
        pending.add(IssuerSource::parse(&server.uri(), true).unwrap());

        let (registry, failures) = pending.setup(&reqwest::Client::new()).await;

        assert!(registry.is_empty());
        assert!(registry.find("https://someone-else.example").is_none());
        assert!(matches!(
            failures.first().map(|f| &f.error),
            Some(FetchError::IssuerMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_setup_excludes_issuer_publishing_other_trailing_slash() {
        let server = MockServer::start().await;
        mount_issuer(&server, &format!("{}/", server.uri())).await;

        let mut pending = PendingIssuers::new();
        pending.add(IssuerSource::parse(&server.uri(), true).unwrap());

        let (registry, failures) = pending.setup(&reqwest::Client::new()).await;

        assert!(registry.is_empty());
        assert!(matches!(
            failures.first().map(|f| &f.error),
            Some(FetchError::IssuerMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_setup_excludes_issuer_with_empty_jwks_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(WELL_KNOWN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "issuer": server.uri(),
                "jwks_uri": format!("{}/jwks", server.uri()),
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let mut pending = PendingIssuers::new();
        pending.add(IssuerSource::parse(&server.uri(), true).unwrap());

        let (registry, failures) = pending.setup(&reqwest::Client::new()).await;

        assert!(registry.is_empty());
        assert!(matches!(
            failures.first().map(|f| &f.error),
            Some(FetchError::EmptyBody { .. })
        ));
    }
}

//! # PKI Test Utilities
//!
//! Shared test utilities for the PKI API.
//!
//! This crate provides:
//! - Fixed RSA keys (PEM fixtures) and deterministic Ed25519 keys, with their JWKs
//! - A token builder that signs with any of those keys
//! - Helpers that damage tokens in controlled ways (tampered signatures, swapped headers)
//! - `MockIssuer`, a wiremock server publishing a discovery document and JWKS
//! - `TestServer`, a spawned axum server for end-to-end tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pki_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let key = RsaTestKey::primary("k1");
//!     let issuer = MockIssuer::start(vec![key.jwk()]).await;
//!
//!     let token = TestTokenBuilder::new(&issuer.issuer())
//!         .for_subject("alice")
//!         .sign_rsa(&key);
//! }
//! ```

pub mod keys;
pub mod mock_issuer;
pub mod server_harness;
pub mod tokens;

pub use keys::*;
pub use mock_issuer::*;
pub use server_harness::*;
pub use tokens::*;

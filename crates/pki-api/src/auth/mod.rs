//! Multi-issuer bearer token authentication.
//!
//! Key material is fetched once at startup and never refreshed; an issuer
//! that rotates its keys is unusable until restart.
//!
//! # Components
//!
//! - `discovery` - configured issuer sources and OpenID discovery documents
//! - `jwks` - issuer key sets and key resolution by `kid` / `x5t`
//! - `registry` - pending issuers, concurrent setup, the frozen lookup registry
//! - `jwt` - token verification
//! - `claims` - the verified claim set handed to request handlers

pub mod claims;
pub mod discovery;
pub mod jwks;
pub mod jwt;
pub mod registry;

pub use claims::VerifiedClaims;
pub use discovery::{DiscoveryMetadata, FetchError, IssuerSource, IssuerSourceError};
pub use jwks::{Jwk, KeySet};
pub use jwt::{TokenRejection, TokenVerifier};
pub use registry::{Issuer, IssuerRegistry, IssuerSetupFailure, PendingIssuers};

//! Verified claim set.
//!
//! A `VerifiedClaims` can only be constructed by the token verifier after the
//! signature and registered claims have been checked. Handlers read it from
//! request extensions; its type is the extension key, so nothing else placed
//! in the extensions can collide with it.

use serde_json::Value;
use std::fmt;

/// Claims of a token whose signature has been verified.
#[derive(Clone)]
pub struct VerifiedClaims {
    issuer: String,
    raw: String,
    value: Value,
}

impl VerifiedClaims {
    pub(crate) fn new(issuer: String, raw: String, value: Value) -> Self {
        Self { issuer, raw, value }
    }

    /// Identifier of the issuer whose key verified the token.
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// The decoded payload segment, byte for byte.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The payload as parsed JSON.
    pub fn json(&self) -> &Value {
        &self.value
    }

    /// `sub` claim, if present and a string.
    pub fn subject(&self) -> Option<&str> {
        self.value.get("sub").and_then(Value::as_str)
    }

    /// Look up any claim by name.
    pub fn get(&self, claim: &str) -> Option<&Value> {
        self.value.get(claim)
    }
}

/// Only the issuer is shown; claim contents may identify a person.
impl fmt::Debug for VerifiedClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifiedClaims")
            .field("issuer", &self.issuer)
            .field("claims", &"[REDACTED]")
            .finish()
    }
}

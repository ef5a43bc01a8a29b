//! Signing keys for tests.
//!
//! RSA keys are fixed 2048-bit PEM fixtures so their public components can be
//! written into JWKs verbatim. Ed25519 keys are derived from a seed byte.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::EncodingKey;
use ring::signature::{Ed25519KeyPair, KeyPair};
use serde_json::{json, Value};

const RSA_KEY_1_PEM: &str = include_str!("../fixtures/rsa_key_1.pem");
const RSA_KEY_1_N: &str = "re4L2eefiqiQv_hbCk-WMUTFG_p-L7fAsccRxvEkCckgwXclW_UDcT9feLwERBbsZBs0gsd-x76HnFh9b0gCX4rvLfWjZ_uMwNuiD_qQMTHTHE9MueufCrNjEwjiMNFhAAgYLSnVPh0wjxtOZRQWncsy2Vi26A_CKbJMjZjWn4ePsaVCnE7ukAay7-IQ8QD0PW-bvL7Ho_-214X5_DBBrorDeUVhdKwJC8MCpf3ASnvcEWQD5KtIJHJ8EnC7DmP94xXIERHGRwbUa8jXWX8Pe6_DvyyMHlMVRSTNYL2xmI4y-INfJxWE3z8Ss_tBraxSdDQUZi9cEyjG1ibgp-bs9Q";
/// SHA-1 thumbprint of `fixtures/rsa_cert_1.pem`, the self-signed certificate for key 1.
const RSA_KEY_1_X5T: &str = "IlOF0oh4Z3LvPcx_e5IVu__prks";

const RSA_KEY_2_PEM: &str = include_str!("../fixtures/rsa_key_2.pem");
const RSA_KEY_2_N: &str = "u9FIUWU1NDdPschqdsaxG0SeGWkB6M6UDUvaX-ZFcZQWVHDx-4lZc3Ud3gyWm7hWB2_arCZ0ge7qeA98WfDLJ30bK4Ihuold8V5FNdAOKzWFxtSKsEfNtvM2gHCP_bygDH13keo-Z1IBMtzAS7VvSRmy_ueZaWGXgvulzsY6LTWNfpF74_ySr_xyFEWQGW4LgGCu_BRulrRMb8nhF8e9HOUnlqJGIBTfsRx8ck60pht65xWfvfkhlznx_SuAn7lI2BNsm83YxkZ7KlwCc4MeArdO6jv7Ks3ET_S-g0ez44klBY8QGjIPYlrm4L3-IwXdm_xE1WrnTc7t4A4hNTLujw";

const RSA_EXPONENT: &str = "AQAB";

/// A fixed RSA test key.
#[derive(Debug, Clone)]
pub struct RsaTestKey {
    kid: String,
    pem: &'static str,
    n: &'static str,
    x5t: Option<&'static str>,
}

impl RsaTestKey {
    /// Key 1. Has a certificate, so its JWK carries `x5t`.
    pub fn primary(kid: &str) -> Self {
        Self {
            kid: kid.to_string(),
            pem: RSA_KEY_1_PEM,
            n: RSA_KEY_1_N,
            x5t: Some(RSA_KEY_1_X5T),
        }
    }

    /// Key 2. No certificate.
    pub fn secondary(kid: &str) -> Self {
        Self {
            kid: kid.to_string(),
            pem: RSA_KEY_2_PEM,
            n: RSA_KEY_2_N,
            x5t: None,
        }
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Base64url RSA modulus.
    pub fn modulus(&self) -> &str {
        self.n
    }

    pub fn thumbprint(&self) -> Option<&str> {
        self.x5t
    }

    pub fn encoding_key(&self) -> EncodingKey {
        EncodingKey::from_rsa_pem(self.pem.as_bytes()).expect("RSA fixture should be valid PEM")
    }

    /// Public JWK without an `alg` restriction.
    pub fn jwk(&self) -> Value {
        let mut jwk = json!({
            "kty": "RSA",
            "kid": self.kid,
            "use": "sig",
            "n": self.n,
            "e": RSA_EXPONENT,
        });
        if let Some(x5t) = self.x5t {
            jwk["x5t"] = json!(x5t);
        }
        jwk
    }

    /// Public JWK restricted to `alg`.
    pub fn jwk_with_alg(&self, alg: &str) -> Value {
        let mut jwk = self.jwk();
        jwk["alg"] = json!(alg);
        jwk
    }

    /// Public JWK with no `kid`, selectable only by thumbprint.
    pub fn jwk_without_kid(&self) -> Value {
        let mut jwk = self.jwk();
        if let Some(obj) = jwk.as_object_mut() {
            obj.remove("kid");
        }
        jwk
    }
}

/// A deterministic Ed25519 test key.
#[derive(Debug, Clone)]
pub struct Ed25519TestKey {
    kid: String,
    public_key: Vec<u8>,
    private_key_pkcs8: Vec<u8>,
}

impl Ed25519TestKey {
    /// The same seed always produces the same keypair.
    pub fn from_seed(kid: &str, seed: u8) -> Self {
        let mut seed_bytes = [0u8; 32];
        for (i, byte) in seed_bytes.iter_mut().enumerate() {
            *byte = seed.wrapping_mul(i as u8).wrapping_add(i as u8).wrapping_add(seed);
        }

        let key_pair = Ed25519KeyPair::from_seed_unchecked(&seed_bytes)
            .expect("32-byte seed should produce a keypair");

        Self {
            kid: kid.to_string(),
            public_key: key_pair.public_key().as_ref().to_vec(),
            private_key_pkcs8: build_pkcs8_from_seed(&seed_bytes),
        }
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn encoding_key(&self) -> EncodingKey {
        EncodingKey::from_ed_der(&self.private_key_pkcs8)
    }

    /// Public JWK (`OKP` / `Ed25519`).
    pub fn jwk(&self) -> Value {
        json!({
            "kty": "OKP",
            "kid": self.kid,
            "use": "sig",
            "crv": "Ed25519",
            "x": URL_SAFE_NO_PAD.encode(&self.public_key),
        })
    }
}

/// Wrap JWKs in a JWKS document.
pub fn jwks(keys: &[Value]) -> Value {
    json!({ "keys": keys })
}

/// PKCS#8 v1 document for an Ed25519 seed (RFC 8410).
fn build_pkcs8_from_seed(seed: &[u8; 32]) -> Vec<u8> {
    let mut pkcs8 = Vec::with_capacity(48);
    // SEQUENCE, 46 bytes
    pkcs8.extend_from_slice(&[0x30, 0x2e]);
    // version INTEGER 0
    pkcs8.extend_from_slice(&[0x02, 0x01, 0x00]);
    // AlgorithmIdentifier { OID 1.3.101.112 }
    pkcs8.extend_from_slice(&[0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70]);
    // privateKey OCTET STRING { OCTET STRING seed }
    pkcs8.extend_from_slice(&[0x04, 0x22, 0x04, 0x20]);
    pkcs8.extend_from_slice(seed);
    pkcs8
}

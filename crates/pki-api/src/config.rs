//! PKI API configuration.
//!
//! Configuration is loaded from environment variables.

use crate::auth::discovery::{IssuerSource, IssuerSourceError, DEFAULT_HTTP_TIMEOUT};
use crate::auth::PendingIssuers;
use axum::http::HeaderValue;
use common::jwt::{DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default server bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Upper bound for `AUTH_HTTP_TIMEOUT_SECONDS`.
pub const MAX_HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// PKI API configuration.
#[derive(Clone)]
pub struct Config {
    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Trusted issuers, in configured order, duplicates removed.
    pub issuers: Vec<IssuerSource>,

    /// Timeout for each discovery and JWKS request.
    pub http_timeout: Duration,

    /// Leeway for `exp`, `nbf` and `iat`.
    pub jwt_clock_skew: Duration,

    /// Whether `http://` issuers are accepted. Development only.
    pub allow_insecure_issuers: bool,

    /// Seconds to keep serving after a shutdown signal.
    pub drain_seconds: u64,

    /// Browser origins allowed to call the API. Empty allows none.
    pub allowed_origins: Vec<HeaderValue>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let issuers: Vec<&str> = self.issuers.iter().map(IssuerSource::issuer).collect();
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("issuers", &issuers)
            .field("http_timeout", &self.http_timeout)
            .field("jwt_clock_skew", &self.jwt_clock_skew)
            .field("allow_insecure_issuers", &self.allow_insecure_issuers)
            .field("drain_seconds", &self.drain_seconds)
            .field("allowed_origins", &self.allowed_origins)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid issuer in AUTH_ISSUERS: {0}")]
    InvalidIssuer(#[from] IssuerSourceError),

    #[error("Invalid HTTP timeout configuration: {0}")]
    InvalidHttpTimeout(String),

    #[error("Invalid JWT clock skew configuration: {0}")]
    InvalidJwtClockSkew(String),

    #[error("Invalid boolean for {name}: '{value}'")]
    InvalidBool { name: String, value: String },

    #[error("Invalid drain period: {0}")]
    InvalidDrainSeconds(String),

    #[error("Invalid origin in ALLOWED_ORIGINS: '{0}'")]
    InvalidOrigin(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let allow_insecure_issuers = match vars.get("AUTH_ALLOW_INSECURE_ISSUERS") {
            Some(value) => parse_bool("AUTH_ALLOW_INSECURE_ISSUERS", value)?,
            None => false,
        };

        let mut issuers: Vec<IssuerSource> = Vec::new();
        for entry in vars
            .get("AUTH_ISSUERS")
            .map(String::as_str)
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
        {
            let source = IssuerSource::parse(entry, allow_insecure_issuers)?;
            if !issuers.contains(&source) {
                issuers.push(source);
            }
        }

        let http_timeout = match vars.get("AUTH_HTTP_TIMEOUT_SECONDS") {
            Some(value) => {
                parse_bounded_seconds("AUTH_HTTP_TIMEOUT_SECONDS", value, MAX_HTTP_TIMEOUT)
                    .map_err(ConfigError::InvalidHttpTimeout)?
            }
            None => DEFAULT_HTTP_TIMEOUT,
        };

        let jwt_clock_skew = match vars.get("JWT_CLOCK_SKEW_SECONDS") {
            Some(value) => parse_bounded_seconds("JWT_CLOCK_SKEW_SECONDS", value, MAX_CLOCK_SKEW)
                .map_err(ConfigError::InvalidJwtClockSkew)?,
            None => DEFAULT_CLOCK_SKEW,
        };

        let drain_seconds = match vars.get("DRAIN_SECONDS") {
            Some(value) => value.parse().map_err(|e| {
                ConfigError::InvalidDrainSeconds(format!(
                    "DRAIN_SECONDS must be a non-negative integer, got '{value}': {e}"
                ))
            })?,
            None => 0,
        };

        let mut allowed_origins = Vec::new();
        for origin in vars
            .get("ALLOWED_ORIGINS")
            .map(String::as_str)
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
        {
            let value = HeaderValue::from_str(origin)
                .map_err(|_| ConfigError::InvalidOrigin(origin.to_string()))?;
            if !allowed_origins.contains(&value) {
                allowed_origins.push(value);
            }
        }

        Ok(Config {
            bind_address,
            issuers,
            http_timeout,
            jwt_clock_skew,
            allow_insecure_issuers,
            drain_seconds,
            allowed_origins,
        })
    }

    /// The configured issuers, ready for setup.
    pub fn pending_issuers(&self) -> PendingIssuers {
        let mut pending = PendingIssuers::new();
        for source in &self.issuers {
            pending.add(source.clone());
        }
        pending
    }
}

/// Parse a whole number of seconds in `1..=max`.
fn parse_bounded_seconds(name: &str, value: &str, max: Duration) -> Result<Duration, String> {
    let secs: u64 = value
        .parse()
        .map_err(|e| format!("{name} must be a valid integer, got '{value}': {e}"))?;

    if secs == 0 {
        return Err(format!("{name} must be positive, got {secs}"));
    }

    if secs > max.as_secs() {
        return Err(format!(
            "{name} must not exceed {} seconds, got {secs}",
            max.as_secs()
        ));
    }

    Ok(Duration::from_secs(secs))
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            name: name.to_string(),
            value: value.to_string(),
        }),
    }
}

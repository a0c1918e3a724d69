//! Configuration structures for appliance clients.
//!
//! This module provides the connection settings and credentials consumed by the
//! transport, including environment loading and validation.

use crate::client::{ClientConfig, RetryPolicy};
use crate::Error;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::time::Duration;
use url::Url;
use validator::Validate;

/// Environment variable holding the appliance host.
pub const ENV_HOST: &str = "OPNSENSE_FIREWALL_HOST";
/// Fallback environment variable for the appliance host.
pub const ENV_HOST_FALLBACK: &str = "OPNSENSE_HOST";
/// Environment variable holding the API key.
pub const ENV_API_KEY: &str = "OPNSENSE_API_KEY";
/// Environment variable holding the API secret.
pub const ENV_API_SECRET: &str = "OPNSENSE_API_SECRET";
/// Environment variable toggling TLS verification.
pub const ENV_VERIFY_SSL: &str = "OPNSENSE_VERIFY_SSL";
/// Environment variable overriding the firewall log endpoint.
pub const ENV_FIREWALL_LOG_ENDPOINT: &str = "OPNSENSE_FIREWALL_LOG_ENDPOINT";

/// API key/secret pair used for HTTP basic authentication.
///
/// Immutable once constructed; the secret is never printed or serialized.
pub struct Credentials {
    key: String,
    secret: SecretString,
}

impl Credentials {
    /// Create a credential pair.
    #[must_use]
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            secret: SecretString::from(secret.into()),
        }
    }

    /// The API key (basic auth username).
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The API secret (basic auth password).
    #[must_use]
    pub fn secret(&self) -> &str {
        self.secret.expose_secret()
    }
}

impl Clone for Credentials {
    fn clone(&self) -> Self {
        Self::new(self.key.clone(), self.secret.expose_secret().to_owned())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("key", &self.key)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Connection settings for one appliance.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct ApplianceConfig {
    /// Hostname, `host:port`, or full base URL
    #[validate(length(min = 1))]
    pub host: String,

    /// API key
    #[validate(length(min = 1))]
    pub api_key: String,

    /// API secret
    #[serde(skip_serializing, deserialize_with = "deserialize_secret")]
    pub api_secret: SecretString,

    /// Whether to verify TLS certificates
    #[serde(default = "default_tls_verify")]
    pub tls_verify: bool,

    /// Request timeout in seconds
    #[validate(range(min = 1, max = 300))]
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Probe timeout in seconds
    #[validate(range(min = 1, max = 60))]
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,

    /// Total attempts per request, including the first
    #[validate(range(min = 1, max = 10))]
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Log endpoint tried before the built-in candidates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firewall_log_endpoint: Option<String>,
}

const fn default_tls_verify() -> bool {
    true
}

const fn default_request_timeout_secs() -> u64 {
    30
}

const fn default_probe_timeout_secs() -> u64 {
    5
}

const fn default_max_attempts() -> u32 {
    3
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}

impl Clone for ApplianceConfig {
    fn clone(&self) -> Self {
        Self {
            host: self.host.clone(),
            api_key: self.api_key.clone(),
            api_secret: SecretString::from(self.api_secret.expose_secret().to_owned()),
            tls_verify: self.tls_verify,
            request_timeout_secs: self.request_timeout_secs,
            probe_timeout_secs: self.probe_timeout_secs,
            max_attempts: self.max_attempts,
            firewall_log_endpoint: self.firewall_log_endpoint.clone(),
        }
    }
}

impl ApplianceConfig {
    /// Create a configuration with required parameters and defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if any field fails validation.
    pub fn new(
        host: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Result<Self, Error> {
        let config = Self {
            host: host.into(),
            api_key: api_key.into(),
            api_secret: SecretString::from(api_secret.into()),
            tls_verify: default_tls_verify(),
            request_timeout_secs: default_request_timeout_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
            max_attempts: default_max_attempts(),
            firewall_log_endpoint: None,
        };

        config.ensure_valid()?;
        Ok(config)
    }

    /// Build a configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a value is invalid.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a value is invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let host = non_empty(ENV_HOST)
            .or_else(|| non_empty(ENV_HOST_FALLBACK))
            .ok_or_else(|| {
                Error::ConfigError(format!("{ENV_HOST} or {ENV_HOST_FALLBACK} must be set"))
            })?;
        let key = non_empty(ENV_API_KEY)
            .ok_or_else(|| Error::ConfigError(format!("{ENV_API_KEY} must be set")))?;
        let secret = non_empty(ENV_API_SECRET)
            .ok_or_else(|| Error::ConfigError(format!("{ENV_API_SECRET} must be set")))?;

        let mut config = Self::new(host, key, secret)?;

        if let Some(raw) = non_empty(ENV_VERIFY_SSL) {
            config.tls_verify = parse_flag(&raw).ok_or_else(|| {
                Error::ConfigError(format!("{ENV_VERIFY_SSL} must be a boolean, got `{raw}`"))
            })?;
        }
        config.firewall_log_endpoint = non_empty(ENV_FIREWALL_LOG_ENDPOINT);

        Ok(config)
    }

    /// Set whether to verify TLS certificates.
    #[must_use]
    pub const fn with_tls_verify(mut self, verify: bool) -> Self {
        self.tls_verify = verify;
        self
    }

    /// Set request timeout in seconds.
    #[must_use]
    pub const fn with_timeout(mut self, seconds: u64) -> Self {
        self.request_timeout_secs = seconds;
        self
    }

    /// Set the attempt ceiling.
    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set the firewall log endpoint override.
    #[must_use]
    pub fn with_firewall_log_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.firewall_log_endpoint = Some(endpoint.into());
        self
    }

    /// Validate all fields.
    ///
    /// # Errors
    ///
    /// Returns a configuration error describing the first invalid field.
    pub fn ensure_valid(&self) -> Result<(), Error> {
        self.validate()
            .map_err(|e| Error::ConfigError(format!("Invalid configuration: {e}")))?;
        if self.api_secret.expose_secret().is_empty() {
            return Err(Error::ConfigError(
                "Invalid configuration: api_secret must not be empty".to_string(),
            ));
        }
        self.base_url().map(|_| ())
    }

    /// Base URL of the appliance. A bare host is assumed to speak HTTPS.
    ///
    /// # Errors
    ///
    /// Returns an error if the host cannot form a valid URL.
    pub fn base_url(&self) -> Result<Url, Error> {
        let host = self.host.trim().trim_end_matches('/');
        let raw = if host.contains("://") {
            host.to_string()
        } else {
            format!("https://{host}")
        };
        Url::parse(&raw).map_err(|e| Error::ConfigError(format!("Invalid appliance host: {e}")))
    }

    /// Credentials for basic authentication.
    #[must_use]
    pub fn credentials(&self) -> Credentials {
        Credentials::new(
            self.api_key.clone(),
            self.api_secret.expose_secret().to_owned(),
        )
    }

    /// Get the request timeout as a Duration.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// HTTP client settings derived from this configuration.
    #[must_use]
    pub const fn client_config(&self) -> ClientConfig {
        ClientConfig::new()
            .with_timeout(Duration::from_secs(self.request_timeout_secs))
            .with_probe_timeout(Duration::from_secs(self.probe_timeout_secs))
            .with_retry_policy(RetryPolicy::new().with_max_attempts(self.max_attempts))
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

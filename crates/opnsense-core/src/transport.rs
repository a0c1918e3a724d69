//! Authenticated, retrying HTTP transport for the appliance API.
//!
//! [`ApplianceClient`] is the single place that talks HTTP. It attaches basic
//! auth, prefixes bare paths with `/api`, retries transient failures with
//! exponential backoff, and turns a `2xx` body carrying `"result": "failed"`
//! into [`Error::ApplicationFailure`]. It also owns the client's
//! [`EndpointProber`] cache.

use crate::client::{ClientConfig, RetryPolicy};
use crate::config::{ApplianceConfig, Credentials};
use crate::probe::{EndpointProber, ProbeResult, ProbeTarget};
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};
use url::Url;

const USER_AGENT: &str = concat!("opnsense-core/", env!("CARGO_PKG_VERSION"));

/// One request to issue. Built per call and not retained.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    /// HTTP method
    pub method: Method,
    /// Path relative to the appliance root
    pub path: String,
    /// URL query pairs
    pub query: Vec<(String, String)>,
    /// JSON body
    pub body: Option<Value>,
}

impl RequestSpec {
    /// A request with no query or body.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    /// A GET request.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// A POST request.
    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Append query pairs.
    #[must_use]
    pub fn with_query<K>(mut self, pairs: &[(K, String)]) -> Self
    where
        K: AsRef<str>,
    {
        self.query.extend(
            pairs
                .iter()
                .map(|(k, v)| (k.as_ref().to_string(), v.clone())),
        );
        self
    }

    /// Set a JSON body.
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Serialize `body` as the JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if `body` cannot be represented as JSON.
    pub fn with_json<B>(self, body: &B) -> Result<Self>
    where
        B: Serialize + ?Sized,
    {
        let value = serde_json::to_value(body)
            .map_err(|err| Error::InvalidRequest(format!("Unserializable body: {err}")))?;
        Ok(self.with_body(value))
    }
}

/// Builder for [`ApplianceClient`].
#[derive(Debug, Clone)]
pub struct ApplianceClientBuilder {
    base_url: Url,
    credentials: Credentials,
    http_config: ClientConfig,
    tls_verify: bool,
}

impl ApplianceClientBuilder {
    /// Create a new builder from a base URL and credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn new(base_url: impl AsRef<str>, credentials: Credentials) -> Result<Self> {
        let mut url = Url::parse(base_url.as_ref()).map_err(|err| {
            Error::ConfigError(format!(
                "Invalid appliance base URL `{}`: {err}",
                base_url.as_ref()
            ))
        })?;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }

        Ok(Self {
            base_url: url,
            credentials,
            http_config: ClientConfig::new(),
            tls_verify: true,
        })
    }

    /// Create a builder from a validated [`ApplianceConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn from_config(config: &ApplianceConfig) -> Result<Self> {
        config.ensure_valid()?;
        Ok(Self::new(config.base_url()?, config.credentials())?
            .with_http_config(config.client_config())
            .with_tls_verify(config.tls_verify))
    }

    /// Override the retry policy.
    #[must_use]
    pub const fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.http_config.retry_policy = retry;
        self
    }

    /// Override the HTTP client configuration.
    #[must_use]
    pub const fn with_http_config(mut self, config: ClientConfig) -> Self {
        self.http_config = config;
        self
    }

    /// Enable or disable TLS certificate verification.
    #[must_use]
    pub const fn with_tls_verify(mut self, verify: bool) -> Self {
        self.tls_verify = verify;
        self
    }

    /// Build the client instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn build(self) -> Result<ApplianceClient> {
        let mut builder = ClientBuilder::new()
            .timeout(self.http_config.timeout)
            .connect_timeout(self.http_config.connect_timeout)
            .user_agent(USER_AGENT)
            .pool_idle_timeout(self.http_config.pool_idle_timeout)
            .pool_max_idle_per_host(self.http_config.pool_max_idle_per_host);

        if !self.http_config.enable_compression {
            builder = builder.no_gzip();
        }
        if !self.tls_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let http = builder.build().map_err(|err| {
            Error::ConfigError(format!("Failed to build appliance HTTP client: {err}"))
        })?;

        Ok(ApplianceClient {
            http,
            base_url: self.base_url,
            credentials: self.credentials,
            retry_policy: self.http_config.retry_policy,
            probe_timeout: self.http_config.probe_timeout,
            prober: Arc::new(EndpointProber::new()),
        })
    }
}

/// Asynchronous client for the appliance REST API.
///
/// Cloning is cheap and clones share the probe cache.
#[derive(Clone)]
pub struct ApplianceClient {
    http: Client,
    base_url: Url,
    credentials: Credentials,
    retry_policy: RetryPolicy,
    probe_timeout: Duration,
    prober: Arc<EndpointProber>,
}

impl ApplianceClient {
    /// Construct directly from a base URL and credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the HTTP client cannot be built.
    pub fn new(base_url: impl AsRef<str>, credentials: Credentials) -> Result<Self> {
        ApplianceClientBuilder::new(base_url, credentials)?.build()
    }

    /// Construct from an [`ApplianceConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn from_config(config: &ApplianceConfig) -> Result<Self> {
        ApplianceClientBuilder::from_config(config)?.build()
    }

    /// Access the base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Access the retry policy.
    #[must_use]
    pub const fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Access the probe cache, e.g. to invalidate an entry.
    #[must_use]
    pub fn prober(&self) -> &EndpointProber {
        &self.prober
    }

    /// Issue `spec`, retrying transient failures.
    ///
    /// # Errors
    ///
    /// Returns the last failure once the attempt ceiling is reached, or the
    /// first non-transient failure immediately.
    pub async fn request(&self, spec: &RequestSpec) -> Result<Value> {
        let max_attempts = self.retry_policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(method = %spec.method, path = %spec.path, attempt, "Appliance request");

            match self.execute(spec, None).await {
                Ok(body) => return Ok(body),
                Err(err) if err.is_transient() && attempt < max_attempts => {
                    let delay = self.retry_policy.delay_for_attempt(attempt);
                    warn!(
                        path = %spec.path,
                        attempt,
                        max_attempts,
                        error = %err,
                        "Transient failure, retrying after {:?}",
                        delay
                    );
                    if delay > Duration::from_millis(0) {
                        sleep(delay).await;
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// GET `path` and return the JSON body.
    ///
    /// # Errors
    ///
    /// See [`ApplianceClient::request`].
    pub async fn get(&self, path: &str) -> Result<Value> {
        self.request(&RequestSpec::get(path)).await
    }

    /// GET `path` with query pairs.
    ///
    /// # Errors
    ///
    /// See [`ApplianceClient::request`].
    pub async fn get_with_query(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        self.request(&RequestSpec::get(path).with_query(query)).await
    }

    /// POST `body` (or nothing) to `path` and return the JSON body.
    ///
    /// # Errors
    ///
    /// See [`ApplianceClient::request`].
    pub async fn post<B>(&self, path: &str, body: Option<&B>) -> Result<Value>
    where
        B: Serialize + ?Sized,
    {
        let mut spec = RequestSpec::post(path);
        if let Some(body) = body {
            spec = spec.with_json(body)?;
        }
        self.request(&spec).await
    }

    /// GET `path` and decode the body as `T`.
    ///
    /// # Errors
    ///
    /// See [`ApplianceClient::request`]; decoding failures are
    /// [`Error::ResponseParseFailure`].
    pub async fn get_json<T>(&self, path: &str) -> Result<T>
    where
        T: DeserializeOwned,
    {
        decode(path, self.get(path).await?)
    }

    /// Resolve a version-dependent capability to a working path.
    ///
    /// Probes at most once per capability for this client; `None` means the
    /// capability is unavailable and callers should return an empty result.
    pub async fn resolve_capability(
        &self,
        capability: &str,
        candidates: &[String],
    ) -> Option<String> {
        match self.prober.probe(self, capability, candidates).await {
            ProbeResult::Resolved(path) => Some(path),
            ProbeResult::Unavailable => None,
        }
    }

    fn build_url(&self, path: &str, query: &[(String, String)]) -> Result<Url> {
        let full = api_path(path);
        let mut url = self
            .base_url
            .join(full.trim_start_matches('/'))
            .map_err(|err| Error::InvalidEndpoint(format!("Invalid path `{path}`: {err}")))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query.iter());
        }
        Ok(url)
    }

    async fn execute(&self, spec: &RequestSpec, timeout: Option<Duration>) -> Result<Value> {
        let url = self.build_url(&spec.path, &spec.query)?;
        let mut request = self
            .http
            .request(spec.method.clone(), url)
            .basic_auth(self.credentials.key(), Some(self.credentials.secret()))
            .header("Accept", "application/json");

        if let Some(body) = &spec.body {
            request = request.json(body);
        }
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        if !status.is_success() {
            return Err(map_status_to_error(
                status,
                String::from_utf8_lossy(&bytes).into_owned(),
            ));
        }

        let body = parse_body(&spec.path, status, &bytes)?;
        check_application_result(&body)?;
        Ok(body)
    }
}

#[async_trait]
impl ProbeTarget for ApplianceClient {
    async fn probe_status(&self, path: &str) -> Result<u16> {
        let url = self.build_url(path, &[])?;
        debug!(path, "Probing endpoint");
        let response = self
            .http
            .get(url)
            .basic_auth(self.credentials.key(), Some(self.credentials.secret()))
            .header("Accept", "application/json")
            .timeout(self.probe_timeout)
            .send()
            .await?;
        Ok(response.status().as_u16())
    }
}

/// Prefix `path` with `/api` unless it already targets `/api` or `/core`.
#[must_use]
pub fn api_path(path: &str) -> String {
    let trimmed = path.trim().trim_start_matches('/');
    let first = trimmed.split('/').next().unwrap_or_default();
    if first == "api" || first == "core" {
        format!("/{trimmed}")
    } else {
        format!("/api/{trimmed}")
    }
}

/// Map a non-success status to an [`Error::HttpFailure`].
#[must_use]
pub fn map_status_to_error(status: StatusCode, body: String) -> Error {
    let message = if body.trim().is_empty() {
        status
            .canonical_reason()
            .unwrap_or("no response body")
            .to_string()
    } else {
        body
    };
    Error::HttpFailure {
        status: status.as_u16(),
        message,
    }
}

fn parse_body(path: &str, status: StatusCode, bytes: &[u8]) -> Result<Value> {
    if status == StatusCode::NO_CONTENT || bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(bytes).map_err(|err| {
        Error::ResponseParseFailure(format!("Invalid JSON from `{path}`: {err}"))
    })
}

/// Detect an appliance-reported failure inside a successful response.
///
/// # Errors
///
/// Returns [`Error::ApplicationFailure`] when `body.result == "failed"`.
pub fn check_application_result(body: &Value) -> Result<()> {
    if body.get("result").and_then(Value::as_str) != Some("failed") {
        return Ok(());
    }

    if let Some(message) = body.get("message").and_then(Value::as_str) {
        if !message.trim().is_empty() {
            return Err(Error::ApplicationFailure(message.to_string()));
        }
    }

    if let Some(validations) = body.get("validations").and_then(Value::as_object) {
        let details: Vec<String> = validations
            .iter()
            .map(|(field, reason)| format!("{field}: {}", crate::wire::text(reason)))
            .collect();
        if !details.is_empty() {
            return Err(Error::ApplicationFailure(details.join("; ")));
        }
    }

    Err(Error::ApplicationFailure("Unknown API error".to_string()))
}

fn decode<T>(path: &str, body: Value) -> Result<T>
where
    T: DeserializeOwned,
{
    serde_json::from_value(body).map_err(|err| {
        Error::ResponseParseFailure(format!("Unexpected response from `{path}`: {err}"))
    })
}

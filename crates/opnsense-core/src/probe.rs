//! Endpoint probing for version-dependent capabilities.
//!
//! Some capabilities (firewall log retrieval in particular) live at different
//! paths depending on the appliance version and installed plugins. The
//! [`EndpointProber`] tries an ordered candidate list once, remembers the first
//! path that answers `200`, and remembers exhaustion just as firmly: later calls
//! for the same capability never touch the network until the entry is
//! invalidated.

use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

/// Something that can report the HTTP status of a lightweight GET.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProbeTarget: Send + Sync {
    /// Issue a single, non-retried GET and return the status code.
    async fn probe_status(&self, path: &str) -> Result<u16>;
}

/// Outcome of probing a capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    /// The first candidate that answered `200`
    Resolved(String),
    /// Every candidate failed
    Unavailable,
}

impl ProbeResult {
    /// The resolved path, if any.
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::Resolved(path) => Some(path),
            Self::Unavailable => None,
        }
    }
}

type ProbeCell = Arc<OnceCell<ProbeResult>>;

/// Per-client cache of probe outcomes.
///
/// Each capability has its own cell: concurrent first callers for one
/// capability wait for a single probe, while other capabilities stay
/// available.
#[derive(Debug, Default)]
pub struct EndpointProber {
    cache: Mutex<HashMap<String, ProbeCell>>,
}

impl EndpointProber {
    /// Create an empty prober.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `capability` against `candidates`, probing at most once.
    ///
    /// Never fails: probe errors are logged and treated as a miss.
    pub async fn probe<T>(&self, target: &T, capability: &str, candidates: &[String]) -> ProbeResult
    where
        T: ProbeTarget + ?Sized,
    {
        let cell = Arc::clone(
            self.cache
                .lock()
                .await
                .entry(capability.to_string())
                .or_default(),
        );
        if let Some(result) = cell.get() {
            debug!(capability, ?result, "Using cached probe result");
            return result.clone();
        }

        cell.get_or_init(|| probe_candidates(target, capability, candidates))
            .await
            .clone()
    }

    /// Cached outcome for `capability`, without probing.
    pub async fn cached(&self, capability: &str) -> Option<ProbeResult> {
        self.cache
            .lock()
            .await
            .get(capability)
            .and_then(|cell| cell.get().cloned())
    }

    /// Forget the outcome for `capability` so the next call probes again.
    ///
    /// Returns true if a finished probe was forgotten. A probe still in
    /// flight completes for its current callers only.
    pub async fn invalidate(&self, capability: &str) -> bool {
        self.cache
            .lock()
            .await
            .remove(capability)
            .is_some_and(|cell| cell.initialized())
    }

    /// Forget every cached outcome.
    pub async fn clear(&self) {
        self.cache.lock().await.clear();
    }
}

async fn probe_candidates<T>(target: &T, capability: &str, candidates: &[String]) -> ProbeResult
where
    T: ProbeTarget + ?Sized,
{
    for candidate in candidates.iter().filter(|c| !c.trim().is_empty()) {
        match target.probe_status(candidate).await {
            Ok(200) => {
                info!(capability, path = %candidate, "Selected endpoint");
                return ProbeResult::Resolved(candidate.clone());
            }
            Ok(401) => {
                warn!(
                    capability,
                    path = %candidate,
                    "Endpoint rejected credentials (401); check API key permissions"
                );
            }
            Ok(404) => debug!(capability, path = %candidate, "Endpoint not found"),
            Ok(status) => debug!(capability, path = %candidate, status, "Endpoint unusable"),
            Err(err) => warn!(capability, path = %candidate, error = %err, "Endpoint probe failed"),
        }
    }

    warn!(
        capability,
        tried = candidates.len(),
        "No working endpoint; capability unavailable for this client"
    );
    ProbeResult::Unavailable
}

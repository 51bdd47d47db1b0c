//! Raw URL → resolver chain → adapter → session.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::AdapterRegistry;
use crate::resolver::{CanonicalUrl, ResolveError, ResolverChain};
use crate::session::{self, DownloadSession, SessionError};

/// Errors returned by the dispatcher.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The raw URL could not be resolved to a canonical one.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// No registered adapter accepts the canonical URL.
    #[error("no adapter recognizes {resolved} (resolved from {raw})\n  Suggestion: run with --resolve-only to inspect the canonical URL")]
    Unrecognizable {
        /// The URL the caller passed in.
        raw: String,
        /// The canonical URL the chain produced.
        resolved: String,
    },

    /// The adapter rejected the URL or decomposition failed.
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Turns raw URLs into download sessions.
///
/// Holds the chain and registry behind `Arc`s; both are immutable, so a
/// dispatcher can be cloned into concurrent tasks freely.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    chain: Arc<ResolverChain>,
    registry: Arc<AdapterRegistry>,
}

impl Dispatcher {
    /// Creates a dispatcher over `chain` and `registry`.
    #[must_use]
    pub fn new(chain: Arc<ResolverChain>, registry: Arc<AdapterRegistry>) -> Self {
        Self { chain, registry }
    }

    /// The resolver chain.
    #[must_use]
    pub fn chain(&self) -> &ResolverChain {
        &self.chain
    }

    /// The adapter registry.
    #[must_use]
    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    /// Resolves `raw` to its first canonical URL and builds the session for it.
    ///
    /// # Errors
    ///
    /// [`DispatchError::Resolve`] when resolution fails,
    /// [`DispatchError::Unrecognizable`] when no adapter matches, and
    /// [`DispatchError::Session`] when the adapter rejects the URL.
    #[instrument(skip(self))]
    pub async fn dispatch(&self, raw: &str) -> Result<DownloadSession, DispatchError> {
        let canonical = self.chain.resolve_one(raw).await?;
        self.select(raw, canonical)
    }

    /// Resolves `raw` to every canonical URL and builds a session for each.
    ///
    /// # Errors
    ///
    /// As [`dispatch`](Self::dispatch); the first unrecognizable terminal
    /// fails the whole call.
    #[instrument(skip(self))]
    pub async fn dispatch_all(&self, raw: &str) -> Result<Vec<DownloadSession>, DispatchError> {
        let terminals = self.chain.resolve_all(raw).await?;
        if terminals.is_empty() {
            warn!(raw, "no canonical URL reachable");
        }
        terminals
            .into_iter()
            .map(|canonical| self.select(raw, canonical))
            .collect()
    }

    /// [`dispatch_all`](Self::dispatch_all) followed by flattening every
    /// composite session into its leaves.
    ///
    /// # Errors
    ///
    /// As [`dispatch_all`](Self::dispatch_all), plus flattening failures.
    #[instrument(skip(self))]
    pub async fn dispatch_and_flatten_all(
        &self,
        raw: &str,
    ) -> Result<Vec<DownloadSession>, DispatchError> {
        let mut leaves = Vec::new();
        for session in self.dispatch_all(raw).await? {
            leaves.extend(session::flatten(session).await?);
        }
        info!(raw, leaves = leaves.len(), "dispatched and flattened");
        Ok(leaves)
    }

    fn select(&self, raw: &str, canonical: CanonicalUrl) -> Result<DownloadSession, DispatchError> {
        let Some(adapter) = self.registry.find(&canonical) else {
            return Err(DispatchError::Unrecognizable {
                raw: raw.to_string(),
                resolved: canonical.to_string(),
            });
        };
        debug!(adapter = adapter.name(), url = %canonical, "adapter selected");
        Ok(adapter.from_url(canonical)?)
    }
}

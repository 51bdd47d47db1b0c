//! Adapters: canonical URL in, [`DownloadSession`] out.
//!
//! # Architecture
//!
//! - [`Adapter`] - predicate plus session constructor for one resource family
//! - [`AdapterRegistry`] - ordered adapters; the first match wins
//! - [`Dispatcher`] - resolver chain + registry, from raw URL to sessions
//!
//! Built-in adapters cover one resource family each: [`PixelDrainFileAdapter`],
//! [`PixelDrainListAdapter`], [`CyberDropFileAdapter`], [`GoFileFolderAdapter`],
//! [`DropboxFileAdapter`] and [`DropboxFolderAdapter`].

mod cyberdrop;
mod dispatch;
mod dropbox;
mod gofile;
mod pixeldrain;
mod registry;

pub use cyberdrop::CyberDropFileAdapter;
pub use dispatch::{DispatchError, Dispatcher};
pub use dropbox::{DropboxFileAdapter, DropboxFolderAdapter};
pub use gofile::GoFileFolderAdapter;
pub use pixeldrain::{PixelDrainFileAdapter, PixelDrainListAdapter};
pub use registry::AdapterRegistry;

use std::sync::Arc;

use crate::download::BatchEngine;
use crate::resolver::{CanonicalUrl, build_default_resolver_chain};
use crate::session::{DownloadSession, SessionError};

/// One resource family: which canonical URLs it accepts and how to wrap them.
pub trait Adapter: Send + Sync {
    /// Adapter name for logging and diagnostics.
    fn name(&self) -> &'static str;

    /// Pure predicate over the canonical URL.
    fn is_valid_for(&self, url: &CanonicalUrl) -> bool;

    /// Builds the session. Must not perform network I/O.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Invalid`] when the URL lacks a resource id.
    fn from_url(&self, url: CanonicalUrl) -> Result<DownloadSession, SessionError>;
}

/// Builds the registry used by the CLI.
///
/// Registration order is the match priority. The built-in predicates are
/// disjoint, so order only matters for adapters added later.
#[must_use]
pub fn build_default_registry(engine: &BatchEngine) -> AdapterRegistry {
    let mut registry = AdapterRegistry::new();
    registry.register(Box::new(PixelDrainFileAdapter::new(engine.clone())));
    registry.register(Box::new(PixelDrainListAdapter::new(engine.clone())));
    registry.register(Box::new(CyberDropFileAdapter::new(engine.clone())));
    registry.register(Box::new(GoFileFolderAdapter::new(engine.clone())));
    registry.register(Box::new(DropboxFileAdapter::new(engine.clone())));
    registry.register(Box::new(DropboxFolderAdapter::new(engine.clone())));
    registry
}

/// Composes the default resolver chain and adapter registry.
#[must_use]
pub fn build_default_dispatcher(engine: &BatchEngine) -> Dispatcher {
    let chain = build_default_resolver_chain(engine.client());
    Dispatcher::new(Arc::new(chain), Arc::new(build_default_registry(engine)))
}

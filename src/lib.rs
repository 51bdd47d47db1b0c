//! netdrive core library
//!
//! Turns links to file-hosting services into download sessions and runs
//! those downloads with bounded concurrency and integrity checks.
//!
//! # Architecture
//!
//! - [`resolver`] - Redirect-resolution chain producing canonical URLs
//! - [`adapter`] - Site adapters, adapter registry and the dispatcher
//! - [`session`] - Download sessions (standalone, directory, composite) and flattening
//! - [`download`] - HTTP transport, batch engine and integrity verification
//!
//! # Example
//!
//! ```no_run
//! use netdrive_core::{BatchEngine, DEFAULT_CONCURRENCY, HttpClient, build_default_dispatcher};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = BatchEngine::new(HttpClient::new()?, DEFAULT_CONCURRENCY)?;
//! let dispatcher = build_default_dispatcher(&engine);
//! let session = dispatcher.dispatch("https://pixeldrain.com/u/abc123").await?;
//! session.download_to_directory(std::path::Path::new("downloads")).await?;
//! # Ok(())
//! # }
//! ```

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod adapter;
pub mod download;
pub mod resolver;
pub mod session;
pub(crate) mod user_agent;

#[cfg(test)]
pub mod test_support;

// Re-export commonly used types
pub use adapter::{
    Adapter, AdapterRegistry, DispatchError, Dispatcher, build_default_dispatcher,
    build_default_registry,
};
pub use download::{
    BatchEngine, BatchError, BatchProgress, BatchSummary, ClientOptions, DEFAULT_CONCURRENCY,
    DEFAULT_MAX_RETRIES, DownloadError, DownloadTask, EngineError, HttpClient, NoProgress,
    RetryPolicy, TaskError,
};
pub use resolver::{
    CanonicalUrl, ResolveError, ResolverChain, ResolverStrategy, build_default_resolver_chain,
};
pub use session::{DownloadSession, SessionError, SessionKind, flatten};

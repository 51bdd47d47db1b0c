//! Redirect-resolution chain: raw URLs in, canonical URLs out.
//!
//! Many hosting links are indirections (embed pages, short links, share
//! links, CDN mirrors). The chain walks them breadth-first until it reaches
//! URLs no strategy claims; those are canonical.
//!
//! # Architecture
//!
//! - [`ResolverStrategy`] - Async trait that individual strategies implement
//! - [`ResolverChain`] - Ordered strategies plus the BFS traversal
//! - [`Resolution`] - Explicit result of one strategy expansion
//! - [`CanonicalUrl`] - A URL the chain proved terminal
//! - [`CyberDropEmbedResolver`], [`CyberDropShortLinkResolver`],
//!   [`DropboxShareResolver`] - built-in strategies
//!
//! # Example
//!
//! ```no_run
//! use netdrive_core::download::HttpClient;
//! use netdrive_core::resolver::build_default_resolver_chain;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let chain = build_default_resolver_chain(&HttpClient::new()?);
//! let canonical = chain.resolve_one("https://cyberdrop.me/e/abc123").await?;
//! println!("canonical: {canonical}");
//! # Ok(())
//! # }
//! ```

mod chain;
mod cyberdrop;
mod dropbox;
mod error;
pub(crate) mod utils;

pub use chain::ResolverChain;
pub use cyberdrop::{CyberDropEmbedResolver, CyberDropShortLinkResolver};
pub use dropbox::DropboxShareResolver;
pub use error::ResolveError;

use std::fmt;

use async_trait::async_trait;
use url::Url;

use crate::download::HttpClient;

/// Default bound on strategy expansions per traversal.
pub const DEFAULT_MAX_EXPANSIONS: usize = 64;

/// Builds the chain used by the CLI.
///
/// Order is load-bearing: the first strategy whose predicate matches a URL
/// handles it. The embed rewrite runs before the short-link follower so
/// `/e/<id>` pages are never sent through a HEAD request. Every strategy here
/// ends at URLs a default adapter accepts.
#[must_use]
pub fn build_default_resolver_chain(client: &HttpClient) -> ResolverChain {
    let mut chain = ResolverChain::new();
    chain.register(Box::new(CyberDropEmbedResolver::new()));
    chain.register(Box::new(CyberDropShortLinkResolver::new(client.clone())));
    chain.register(Box::new(DropboxShareResolver::new(client.clone())));
    chain
}

/// A URL that needs no further indirection.
///
/// Only the resolver chain produces these; resolving one again yields itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalUrl(Url);

impl CanonicalUrl {
    pub(crate) fn new(url: Url) -> Self {
        Self(url)
    }

    /// The parsed URL.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.0
    }

    /// The URL as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for CanonicalUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl AsRef<str> for CanonicalUrl {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// How a strategy computes its next hops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    /// Pure string transformation, no I/O.
    Rewrite,
    /// Issues HTTP requests and reads redirect targets.
    RedirectFollow,
}

/// Outcome of expanding one URL with one strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Zero or more next-hop URLs.
    Resolved(Vec<String>),
    /// This branch cannot continue; the reason is logged.
    Unresolvable(String),
}

impl Resolution {
    /// A single next hop.
    #[must_use]
    pub fn single(url: impl Into<String>) -> Self {
        Self::Resolved(vec![url.into()])
    }
}

/// Trait for URL indirection strategies.
///
/// Strategies must be `Send + Sync` so a chain can be shared across tasks.
#[async_trait]
pub trait ResolverStrategy: Send + Sync {
    /// Strategy name for logging.
    fn name(&self) -> &'static str;

    /// Whether this strategy is a pure rewrite or performs network I/O.
    fn kind(&self) -> StrategyKind;

    /// Pure predicate: does this strategy claim `url`?
    fn is_solvable(&self, url: &Url) -> bool;

    /// Expands `url` into next hops.
    async fn resolve(&self, url: &Url) -> Resolution;
}

/// Limits for a traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveContext {
    /// Maximum strategy expansions before the traversal stops.
    pub max_expansions: usize,
}

impl Default for ResolveContext {
    fn default() -> Self {
        Self {
            max_expansions: DEFAULT_MAX_EXPANSIONS,
        }
    }
}

/// Follows HEAD redirects from `url`, mapping failures to an unresolvable branch.
async fn follow_to_final(client: &HttpClient, url: &Url) -> Resolution {
    match client.follow_redirects(url.as_str()).await {
        Ok(target) => Resolution::single(target),
        Err(error) => Resolution::Unresolvable(error.to_string()),
    }
}

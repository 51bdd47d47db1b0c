//! CyberDrop indirections: embed viewer pages and bare short links.

use async_trait::async_trait;
use tracing::debug;
use url::Url;

use super::utils::{first_segment, host_is, path_segments};
use super::{Resolution, ResolverStrategy, StrategyKind, follow_to_final};
use crate::download::HttpClient;

const CYBERDROP_HOST: &[&str] = &["cyberdrop", "me"];

/// Rewrites `cyberdrop.me/e/<id>` embed pages to the `/f/<id>` file page.
#[derive(Debug, Default)]
pub struct CyberDropEmbedResolver;

impl CyberDropEmbedResolver {
    /// Creates the strategy.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ResolverStrategy for CyberDropEmbedResolver {
    fn name(&self) -> &'static str {
        "cyberdrop-embed"
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Rewrite
    }

    fn is_solvable(&self, url: &Url) -> bool {
        host_is(url, CYBERDROP_HOST) && first_segment(url) == Some("e")
    }

    async fn resolve(&self, url: &Url) -> Resolution {
        let rest: Vec<&str> = path_segments(url).into_iter().skip(1).collect();
        let rest = rest.join("/");
        let mut target = url.clone();
        target.set_path(&format!("/f/{rest}"));
        debug!(from = %url, to = %target, "rewrote embed page");
        Resolution::single(target)
    }
}

/// Follows `cyberdrop.me/<code>` short links to wherever they redirect.
#[derive(Debug, Clone)]
pub struct CyberDropShortLinkResolver {
    client: HttpClient,
}

impl CyberDropShortLinkResolver {
    /// Creates the strategy on top of `client`.
    #[must_use]
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResolverStrategy for CyberDropShortLinkResolver {
    fn name(&self) -> &'static str {
        "cyberdrop-short-link"
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::RedirectFollow
    }

    fn is_solvable(&self, url: &Url) -> bool {
        if !host_is(url, CYBERDROP_HOST) {
            return false;
        }
        let segments = path_segments(url);
        segments.len() == 1 && !segments[0].is_empty()
    }

    async fn resolve(&self, url: &Url) -> Resolution {
        follow_to_final(&self.client, url).await
    }
}

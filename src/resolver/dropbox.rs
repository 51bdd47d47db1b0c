use async_trait::async_trait;
use url::Url;

use super::utils::{first_segment, host_ends_with};
use super::{Resolution, ResolverStrategy, StrategyKind};
use crate::download::{HttpClient, RedirectHop};

/// Dropbox `/s/` and `/sh/` share links.
///
/// One HEAD without following redirects; the `Location` answer is the next
/// hop. A share link that does not redirect is treated as a dead branch.
#[derive(Debug, Clone)]
pub struct DropboxShareResolver {
    client: HttpClient,
}

impl DropboxShareResolver {
    /// Creates the strategy on top of `client`.
    #[must_use]
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResolverStrategy for DropboxShareResolver {
    fn name(&self) -> &'static str {
        "dropbox-share"
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::RedirectFollow
    }

    fn is_solvable(&self, url: &Url) -> bool {
        host_ends_with(url, &["dropbox", "com"]) && matches!(first_segment(url), Some("s" | "sh"))
    }

    async fn resolve(&self, url: &Url) -> Resolution {
        match self.client.head_redirect(url.as_str()).await {
            Ok(RedirectHop::Redirect(target)) => Resolution::single(target),
            Ok(RedirectHop::Final(_)) => {
                Resolution::Unresolvable("share link did not redirect".to_string())
            }
            Err(error) => Resolution::Unresolvable(error.to_string()),
        }
    }
}

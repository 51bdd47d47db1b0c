use std::fmt;

use tracing::debug;

use super::Adapter;
use crate::resolver::CanonicalUrl;

/// Ordered list of adapters. Immutable once handed to a [`Dispatcher`](super::Dispatcher).
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: Vec<Box<dyn Adapter>>,
}

impl AdapterRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an adapter. Duplicates are kept; the earlier one wins.
    pub fn register(&mut self, adapter: Box<dyn Adapter>) {
        debug!(name = adapter.name(), position = self.adapters.len(), "registering adapter");
        self.adapters.push(adapter);
    }

    /// First adapter, in registration order, whose predicate accepts `url`.
    #[must_use]
    pub fn find(&self, url: &CanonicalUrl) -> Option<&dyn Adapter> {
        self.adapters
            .iter()
            .find(|adapter| adapter.is_valid_for(url))
            .map(AsRef::as_ref)
    }

    /// Adapter names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.adapters.iter().map(|a| a.name()).collect()
    }

    /// Number of registered adapters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    /// Whether no adapter is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("adapters", &self.names())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::session::{DownloadSession, SessionError};
    use crate::test_support::fake_sessions::{FakeStandalone, fake_url};

    struct PrefixAdapter {
        name: &'static str,
        prefix: &'static str,
    }

    impl Adapter for PrefixAdapter {
        fn name(&self) -> &'static str {
            self.name
        }

        fn is_valid_for(&self, url: &CanonicalUrl) -> bool {
            url.url().path().starts_with(self.prefix)
        }

        fn from_url(&self, _url: CanonicalUrl) -> Result<DownloadSession, SessionError> {
            Ok(FakeStandalone::new(self.name).into_session())
        }
    }

    #[test]
    fn test_first_registered_match_wins() {
        let mut registry = AdapterRegistry::new();
        registry.register(Box::new(PrefixAdapter { name: "broad", prefix: "/" }));
        registry.register(Box::new(PrefixAdapter { name: "narrow", prefix: "/u/" }));

        assert_eq!(registry.find(&fake_url("u/abc")).unwrap().name(), "broad");
        assert_eq!(registry.len(), 2);
        assert!(format!("{registry:?}").contains("narrow"));
    }

    #[test]
    fn test_duplicates_are_kept_and_nothing_matches_empty() {
        let mut registry = AdapterRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.find(&fake_url("x")).is_none());

        registry.register(Box::new(PrefixAdapter { name: "same", prefix: "/u/" }));
        registry.register(Box::new(PrefixAdapter { name: "same", prefix: "/u/" }));
        assert_eq!(registry.names(), vec!["same", "same"]);
        assert!(registry.find(&fake_url("l/abc")).is_none());
    }
}

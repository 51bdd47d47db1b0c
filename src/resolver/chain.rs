//! Ordered strategy collection and breadth-first traversal.

use std::collections::{HashSet, VecDeque};
use std::fmt;

use tracing::{debug, info, warn};
use url::Url;

use super::{CanonicalUrl, ResolveContext, ResolveError, Resolution, ResolverStrategy};

/// An ordered list of resolver strategies.
///
/// For each URL the first strategy (in registration order) whose predicate
/// matches is used; a URL no strategy claims is terminal. Immutable after
/// composition, so a chain can be shared behind an `Arc`.
pub struct ResolverChain {
    strategies: Vec<Box<dyn ResolverStrategy>>,
    context: ResolveContext,
}

impl ResolverChain {
    /// Creates an empty chain with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
            context: ResolveContext::default(),
        }
    }

    /// Replaces the traversal limits.
    #[must_use]
    pub fn with_context(mut self, context: ResolveContext) -> Self {
        self.context = context;
        self
    }

    /// Appends a strategy. Duplicates are not detected.
    #[tracing::instrument(skip(self, strategy), fields(strategy_name))]
    pub fn register(&mut self, strategy: Box<dyn ResolverStrategy>) {
        tracing::Span::current().record("strategy_name", strategy.name());
        debug!(name = strategy.name(), kind = ?strategy.kind(), "registering strategy");
        self.strategies.push(strategy);
    }

    /// Returns the number of registered strategies.
    #[must_use]
    pub fn strategy_count(&self) -> usize {
        self.strategies.len()
    }

    /// Returns strategy names in registration order.
    #[must_use]
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Whether any strategy claims `url`. Unparsable input is never resolvable.
    #[must_use]
    pub fn is_resolvable(&self, url: &str) -> bool {
        Url::parse(url).is_ok_and(|parsed| self.find_strategy(&parsed).is_some())
    }

    /// Resolves `url` to the first terminal URL in BFS discovery order.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::InvalidUrl`] for unparsable input and
    /// [`ResolveError::Unresolvable`] when traversal ends without a terminal
    /// (every branch failed, cycled back, or hit the expansion bound).
    #[tracing::instrument(skip(self))]
    pub async fn resolve_one(&self, url: &str) -> Result<CanonicalUrl, ResolveError> {
        let mut terminals = self.traverse(url, true).await?;
        if terminals.is_empty() {
            return Err(ResolveError::unresolvable(
                url,
                "no terminal URL reachable (all branches failed or cycled)",
            ));
        }
        Ok(terminals.swap_remove(0))
    }

    /// Resolves `url` to every reachable terminal URL, possibly none.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::InvalidUrl`] for unparsable input.
    #[tracing::instrument(skip(self))]
    pub async fn resolve_all(&self, url: &str) -> Result<Vec<CanonicalUrl>, ResolveError> {
        self.traverse(url, false).await
    }

    fn find_strategy(&self, url: &Url) -> Option<&dyn ResolverStrategy> {
        self.strategies
            .iter()
            .find(|s| s.is_solvable(url))
            .map(AsRef::as_ref)
    }

    async fn traverse(
        &self,
        input: &str,
        stop_at_first: bool,
    ) -> Result<Vec<CanonicalUrl>, ResolveError> {
        let start = Url::parse(input).map_err(|e| ResolveError::invalid_url(input, e))?;

        let mut visited: HashSet<String> = HashSet::from([start.as_str().to_string()]);
        let mut queue = VecDeque::from([start]);
        let mut terminals = Vec::new();
        let mut expansions = 0usize;

        while let Some(current) = queue.pop_front() {
            let Some(strategy) = self.find_strategy(&current) else {
                debug!(url = %current, "terminal URL");
                terminals.push(CanonicalUrl::new(current));
                if stop_at_first {
                    break;
                }
                continue;
            };

            if expansions >= self.context.max_expansions {
                warn!(
                    input,
                    max_expansions = self.context.max_expansions,
                    "expansion limit reached, stopping traversal"
                );
                break;
            }
            expansions += 1;

            match strategy.resolve(&current).await {
                Resolution::Resolved(next) => {
                    info!(strategy = strategy.name(), from = %current, to = ?next, "resolved");
                    for hop in next {
                        match Url::parse(&hop) {
                            Ok(parsed) => {
                                if visited.insert(parsed.as_str().to_string()) {
                                    queue.push_back(parsed);
                                } else {
                                    debug!(url = %parsed, "already visited, skipping");
                                }
                            }
                            Err(error) => {
                                warn!(strategy = strategy.name(), hop = %hop, error = %error, "discarding unparsable hop");
                            }
                        }
                    }
                }
                Resolution::Unresolvable(reason) => {
                    warn!(strategy = strategy.name(), url = %current, reason = %reason, "branch failed");
                }
            }
        }

        Ok(terminals)
    }
}

impl Default for ResolverChain {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ResolverChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverChain")
            .field("strategies", &self.strategy_names())
            .field("context", &self.context)
            .finish()
    }
}

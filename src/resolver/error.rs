//! Error types for resolver operations.
//!
//! Messages follow the What/Why/Suggestion layout used across the crate.

use thiserror::Error;

/// Errors that can occur while resolving a URL.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    /// The input is not a parsable absolute URL.
    #[error("invalid URL '{input}': {reason}\n  Suggestion: pass an absolute http(s) URL")]
    InvalidUrl {
        /// The rejected input.
        input: String,
        /// Parser message.
        reason: String,
    },

    /// No terminal URL was reachable from the input.
    #[error("URL '{input}' cannot be resolved: {reason}\n  Suggestion: {suggestion}")]
    Unresolvable {
        /// The input that failed.
        input: String,
        /// Why traversal ended without a terminal URL.
        reason: String,
        /// How to fix the issue.
        suggestion: String,
    },
}

impl ResolveError {
    /// Creates an `InvalidUrl` error.
    #[must_use]
    pub fn invalid_url(input: &str, reason: impl ToString) -> Self {
        Self::InvalidUrl {
            input: input.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Creates an `Unresolvable` error.
    #[must_use]
    pub fn unresolvable(input: &str, reason: &str) -> Self {
        Self::Unresolvable {
            input: input.to_string(),
            reason: reason.to_string(),
            suggestion: "Check that the link is still live, or run with -v to see each hop"
                .to_string(),
        }
    }
}

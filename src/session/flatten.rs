//! Decomposes composite sessions into leaf sessions.

use std::collections::VecDeque;

use tracing::{debug, instrument};

use super::{DownloadSession, SessionError};

/// Default bound on composite nesting.
pub const DEFAULT_MAX_DEPTH: usize = 16;

/// Flattens `session` into its leaves, breadth-first, with the default depth bound.
///
/// A non-composite session flattens to itself.
///
/// # Errors
///
/// Propagates `separate()` failures and returns
/// [`SessionError::DepthExceeded`] past [`DEFAULT_MAX_DEPTH`].
pub async fn flatten(session: DownloadSession) -> Result<Vec<DownloadSession>, SessionError> {
    flatten_with_depth(session, DEFAULT_MAX_DEPTH).await
}

/// As [`flatten`], with an explicit depth bound. The root is depth 0.
///
/// # Errors
///
/// As [`flatten`].
#[instrument(skip(session), fields(root = %session.identity()))]
pub async fn flatten_with_depth(
    session: DownloadSession,
    max_depth: usize,
) -> Result<Vec<DownloadSession>, SessionError> {
    let mut queue = VecDeque::from([(session, 0usize)]);
    let mut leaves = Vec::new();

    while let Some((current, depth)) = queue.pop_front() {
        if !current.is_composite() {
            leaves.push(current);
            continue;
        }
        if depth >= max_depth {
            return Err(SessionError::DepthExceeded { depth: max_depth });
        }
        let children = current.separate().await?;
        queue.extend(children.into_iter().map(|child| (child, depth + 1)));
    }

    debug!(leaves = leaves.len(), "flattened");
    Ok(leaves)
}

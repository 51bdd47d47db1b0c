//! Error types for download sessions.

use std::path::PathBuf;

use thiserror::Error;

use crate::download::{BatchError, DownloadError, TaskError};

/// Errors raised while building, decomposing or downloading a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The host answered but the resource is gone, private or malformed.
    #[error("resource {url} is invalid: {reason}")]
    Invalid {
        /// Canonical URL of the resource.
        url: String,
        /// What the host reported.
        reason: String,
    },

    /// A standalone resource did not produce exactly one file.
    #[error("resource {identity} must produce exactly one file, found {}: [{}]", found.len(), found.join(", "))]
    Constraint {
        /// Identity of the offending session.
        identity: String,
        /// Entry names found in the scratch directory.
        found: Vec<String>,
    },

    /// One or more files of a multi-file download failed.
    #[error(transparent)]
    Download(#[from] BatchError),

    /// A single-file transfer failed.
    #[error(transparent)]
    Transfer(#[from] TaskError),

    /// A metadata request to the host's API failed.
    #[error(transparent)]
    Api(#[from] DownloadError),

    /// Local filesystem failure.
    #[error("IO error at {path}: {source}")]
    Io {
        /// Path involved.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A downloaded archive could not be unpacked.
    #[error("cannot extract archive {path}: {reason}")]
    Archive {
        /// Archive on disk.
        path: PathBuf,
        /// What the archive reader reported.
        reason: String,
    },

    /// The session kind has no such capability.
    #[error("{kind} session {identity} does not support {operation}")]
    Unsupported {
        /// Identity of the session.
        identity: String,
        /// Session kind name.
        kind: &'static str,
        /// Requested operation.
        operation: &'static str,
    },

    /// Composite nesting went deeper than the flattener allows.
    #[error("composite nesting exceeds depth {depth}")]
    DepthExceeded {
        /// The configured limit.
        depth: usize,
    },
}

impl SessionError {
    /// Creates an `Invalid` error.
    #[must_use]
    pub fn invalid(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates an `Archive` error.
    #[must_use]
    pub fn archive(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Archive {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates an `Io` error.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

//! Download sessions: what an adapter hands back for a canonical URL.
//!
//! A [`DownloadSession`] wraps exactly one of three capabilities:
//!
//! - [`StandaloneResource`] - a single file
//! - [`DirectoryResource`] - an open-ended set of files materialized into a directory
//! - [`CompositeResource`] - a resource that decomposes into child sessions
//!
//! Construction never touches the network; all I/O happens in the download
//! and [`separate`](DownloadSession::separate) calls.

mod error;
mod flatten;

pub use error::SessionError;
pub use flatten::{DEFAULT_MAX_DEPTH, flatten, flatten_with_depth};

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use crate::download::BatchSummary;
use crate::resolver::CanonicalUrl;

/// A resource that downloads as exactly one file.
#[async_trait]
pub trait StandaloneResource: Send + Sync {
    /// Deterministic key derived from the URL structure.
    fn resource_id(&self) -> String;

    /// Writes the file into `dir` under its server-side name and returns its path.
    async fn download_to_directory(&self, dir: &Path) -> Result<PathBuf, SessionError>;
}

/// A resource that materializes as many files below a directory.
#[async_trait]
pub trait DirectoryResource: Send + Sync {
    /// Deterministic key derived from the URL structure.
    fn resource_id(&self) -> String;

    /// Writes every file below `dir`, which already exists.
    async fn download_to_directory(&self, dir: &Path) -> Result<BatchSummary, SessionError>;
}

/// A resource made of other resources.
#[async_trait]
pub trait CompositeResource: Send + Sync {
    /// Deterministic key derived from the URL structure.
    fn resource_id(&self) -> String;

    /// Immediate children. Performs metadata requests only, never downloads.
    async fn separate(&self) -> Result<Vec<DownloadSession>, SessionError>;

    /// Downloads every child into `dir`, which already exists.
    async fn download_to_directory(&self, dir: &Path) -> Result<BatchSummary, SessionError>;
}

/// The capability a session carries.
pub enum SessionKind {
    /// Exactly one file.
    Standalone(Box<dyn StandaloneResource>),
    /// A set of files written below a directory.
    Directory(Box<dyn DirectoryResource>),
    /// Decomposes into child sessions.
    Composite(Box<dyn CompositeResource>),
}

impl SessionKind {
    /// Short lowercase name of the variant.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Standalone(_) => "standalone",
            Self::Directory(_) => "directory",
            Self::Composite(_) => "composite",
        }
    }

    fn resource_id(&self) -> String {
        match self {
            Self::Standalone(r) => r.resource_id(),
            Self::Directory(r) => r.resource_id(),
            Self::Composite(r) => r.resource_id(),
        }
    }
}

/// A downloadable resource bound to its canonical URL.
pub struct DownloadSession {
    url: CanonicalUrl,
    adapter: &'static str,
    identity: OnceLock<String>,
    kind: SessionKind,
}

impl DownloadSession {
    /// Wraps `kind` for `url`, as built by the adapter named `adapter`.
    #[must_use]
    pub fn new(url: CanonicalUrl, adapter: &'static str, kind: SessionKind) -> Self {
        Self {
            url,
            adapter,
            identity: OnceLock::new(),
            kind,
        }
    }

    /// The canonical URL this session was built from.
    #[must_use]
    pub fn url(&self) -> &CanonicalUrl {
        &self.url
    }

    /// Name of the adapter that built this session.
    #[must_use]
    pub fn adapter_name(&self) -> &'static str {
        self.adapter
    }

    /// The session's capability.
    #[must_use]
    pub fn kind(&self) -> &SessionKind {
        &self.kind
    }

    /// Whether this session decomposes into children.
    #[must_use]
    pub fn is_composite(&self) -> bool {
        matches!(self.kind, SessionKind::Composite(_))
    }

    /// Stable resource key, computed on first access and cached.
    pub fn identity(&self) -> &str {
        self.identity.get_or_init(|| self.kind.resource_id())
    }

    /// Downloads a standalone resource to exactly `path`.
    ///
    /// The file is fetched into a scratch directory first; the scratch
    /// directory must then hold exactly one regular file, which is copied to
    /// `path` (parent directories are created). The scratch directory is
    /// removed on every exit path.
    ///
    /// # Errors
    ///
    /// [`SessionError::Unsupported`] for non-standalone sessions,
    /// [`SessionError::Constraint`] when the scratch directory does not hold
    /// exactly one file, and transfer or filesystem errors otherwise.
    #[instrument(skip(self, path), fields(identity = %self.identity(), path = %path.display()))]
    pub async fn download_to_file(&self, path: &Path) -> Result<u64, SessionError> {
        let SessionKind::Standalone(resource) = &self.kind else {
            return Err(self.unsupported("download_to_file"));
        };

        let scratch = tempfile::TempDir::new().map_err(|e| SessionError::io(std::env::temp_dir(), e))?;
        resource.download_to_directory(scratch.path()).await?;

        let entries = list_entries(scratch.path()).await?;
        let [(name, source, true)] = entries.as_slice() else {
            return Err(SessionError::Constraint {
                identity: self.identity().to_string(),
                found: entries.iter().map(|(name, _, _)| name.clone()).collect(),
            });
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SessionError::io(parent, e))?;
        }
        let bytes = tokio::fs::copy(source, path)
            .await
            .map_err(|e| SessionError::io(path, e))?;
        info!(file = %name, bytes, "standalone download complete");
        Ok(bytes)
    }

    /// Downloads the resource below `dir`, creating it first.
    ///
    /// Standalone sessions write their single file under its server-side
    /// name; composite sessions download every child.
    ///
    /// # Errors
    ///
    /// Returns transfer, aggregate or filesystem errors from the resource.
    #[instrument(skip(self, dir), fields(identity = %self.identity(), dir = %dir.display()))]
    pub async fn download_to_directory(&self, dir: &Path) -> Result<BatchSummary, SessionError> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| SessionError::io(dir, e))?;

        match &self.kind {
            SessionKind::Standalone(resource) => {
                let path = resource.download_to_directory(dir).await?;
                let bytes = tokio::fs::metadata(&path)
                    .await
                    .map_err(|e| SessionError::io(&path, e))?
                    .len();
                Ok(BatchSummary {
                    completed: 1,
                    bytes,
                })
            }
            SessionKind::Directory(resource) => resource.download_to_directory(dir).await,
            SessionKind::Composite(resource) => resource.download_to_directory(dir).await,
        }
    }

    /// Immediate children of a composite session.
    ///
    /// # Errors
    ///
    /// [`SessionError::Unsupported`] for non-composite sessions, plus any
    /// metadata error from the resource.
    pub async fn separate(&self) -> Result<Vec<DownloadSession>, SessionError> {
        match &self.kind {
            SessionKind::Composite(resource) => {
                let children = resource.separate().await?;
                debug!(identity = %self.identity(), children = children.len(), "separated composite");
                Ok(children)
            }
            _ => Err(self.unsupported("separate")),
        }
    }

    fn unsupported(&self, operation: &'static str) -> SessionError {
        SessionError::Unsupported {
            identity: self.identity().to_string(),
            kind: self.kind.name(),
            operation,
        }
    }
}

impl fmt::Debug for DownloadSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadSession")
            .field("url", &self.url.as_str())
            .field("adapter", &self.adapter)
            .field("kind", &self.kind.name())
            .field("identity", &self.identity.get())
            .finish()
    }
}

/// Lists `(name, path, is_file)` for every entry of `dir`, sorted by name.
async fn list_entries(dir: &Path) -> Result<Vec<(String, PathBuf, bool)>, SessionError> {
    let mut reader = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| SessionError::io(dir, e))?;
    let mut entries = Vec::new();
    while let Some(entry) = reader
        .next_entry()
        .await
        .map_err(|e| SessionError::io(dir, e))?
    {
        let is_file = entry
            .file_type()
            .await
            .map_err(|e| SessionError::io(entry.path(), e))?
            .is_file();
        entries.push((entry.file_name().to_string_lossy().into_owned(), entry.path(), is_file));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(entries)
}

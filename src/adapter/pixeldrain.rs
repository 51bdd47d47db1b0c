//! PixelDrain files (`/u/<id>`) and lists (`/l/<id>`).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use super::Adapter;
use crate::download::{BatchEngine, BatchSummary, Checksum, DownloadTask, sanitize_filename};
use crate::resolver::CanonicalUrl;
use crate::resolver::utils::{first_segment, host_ends_with, id_after_prefix};
use crate::session::{
    CompositeResource, DownloadSession, SessionError, SessionKind, StandaloneResource,
};

/// Public API root.
pub const PIXELDRAIN_API_BASE: &str = "https://pixeldrain.com";

const HOST: &[&str] = &["pixeldrain", "com"];

#[derive(Debug, Deserialize)]
struct FileInfo {
    name: String,
    size: u64,
    #[serde(default)]
    hash_sha256: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListInfo {
    files: Vec<ListEntry>,
}

#[derive(Debug, Deserialize)]
struct ListEntry {
    id: String,
    name: String,
    size: u64,
    #[serde(default)]
    hash_sha256: Option<String>,
}

/// API endpoints plus the engine that performs transfers.
#[derive(Debug, Clone)]
struct PixelDrainApi {
    engine: BatchEngine,
    base: Arc<str>,
}

impl PixelDrainApi {
    fn download_url(&self, id: &str) -> String {
        format!("{}/api/file/{id}?download=1", self.base)
    }

    async fn file_info(&self, id: &str) -> Result<FileInfo, SessionError> {
        let url = format!("{}/api/file/{id}/info", self.base);
        Ok(self.engine.client().get_json(&url).await?)
    }

    async fn list_info(&self, id: &str) -> Result<ListInfo, SessionError> {
        let url = format!("{}/api/list/{id}", self.base);
        Ok(self.engine.client().get_json(&url).await?)
    }

    fn task(&self, id: &str, dest: PathBuf, size: u64, sha256: Option<String>) -> DownloadTask {
        let task = DownloadTask::new(self.download_url(id), dest).with_expected_size(size);
        match sha256 {
            Some(hex) => task.with_checksum(Checksum::Sha256(hex)),
            None => task,
        }
    }
}

struct PixelDrainFile {
    id: String,
    api: PixelDrainApi,
}

#[async_trait]
impl StandaloneResource for PixelDrainFile {
    fn resource_id(&self) -> String {
        format!("pixeldrain_file_{}", self.id)
    }

    #[instrument(skip(self, dir), fields(id = %self.id))]
    async fn download_to_directory(&self, dir: &Path) -> Result<PathBuf, SessionError> {
        let info = self.api.file_info(&self.id).await?;
        let dest = dir.join(sanitize_filename(&info.name));
        debug!(name = %info.name, size = info.size, "file info");
        let task = self.api.task(&self.id, dest.clone(), info.size, info.hash_sha256);
        self.api.engine.run_task(task).await?;
        Ok(dest)
    }
}

struct PixelDrainList {
    id: String,
    api: PixelDrainApi,
}

#[async_trait]
impl CompositeResource for PixelDrainList {
    fn resource_id(&self) -> String {
        format!("pixeldrain_list_{}", self.id)
    }

    async fn separate(&self) -> Result<Vec<DownloadSession>, SessionError> {
        let list = self.api.list_info(&self.id).await?;
        list.files
            .into_iter()
            .map(|entry| {
                let page = format!("{PIXELDRAIN_API_BASE}/u/{}", entry.id);
                let url = Url::parse(&page).map_err(|e| SessionError::invalid(&page, e.to_string()))?;
                let file = PixelDrainFile {
                    id: entry.id,
                    api: self.api.clone(),
                };
                Ok(DownloadSession::new(
                    CanonicalUrl::new(url),
                    FILE_ADAPTER,
                    SessionKind::Standalone(Box::new(file)),
                ))
            })
            .collect()
    }

    #[instrument(skip(self, dir), fields(id = %self.id))]
    async fn download_to_directory(&self, dir: &Path) -> Result<BatchSummary, SessionError> {
        let list = self.api.list_info(&self.id).await?;
        let tasks = list
            .files
            .into_iter()
            .map(|entry| {
                let dest = dir.join(sanitize_filename(&entry.name));
                self.api.task(&entry.id, dest, entry.size, entry.hash_sha256)
            })
            .collect();
        Ok(self.api.engine.run_batch(tasks).await?)
    }
}

const FILE_ADAPTER: &str = "pixeldrain-file";
const LIST_ADAPTER: &str = "pixeldrain-list";

/// `pixeldrain.com/u/<id>`: a single file, SHA-256 verified.
#[derive(Debug, Clone)]
pub struct PixelDrainFileAdapter {
    api: PixelDrainApi,
}

impl PixelDrainFileAdapter {
    /// Adapter against the public API.
    #[must_use]
    pub fn new(engine: BatchEngine) -> Self {
        Self::with_api_base(engine, PIXELDRAIN_API_BASE)
    }

    /// Adapter against an alternative API root.
    #[must_use]
    pub fn with_api_base(engine: BatchEngine, base: &str) -> Self {
        Self {
            api: PixelDrainApi {
                engine,
                base: Arc::from(base.trim_end_matches('/')),
            },
        }
    }
}

impl Adapter for PixelDrainFileAdapter {
    fn name(&self) -> &'static str {
        FILE_ADAPTER
    }

    fn is_valid_for(&self, url: &CanonicalUrl) -> bool {
        host_ends_with(url.url(), HOST) && first_segment(url.url()) == Some("u")
    }

    fn from_url(&self, url: CanonicalUrl) -> Result<DownloadSession, SessionError> {
        let id = id_after_prefix(url.url(), "u")
            .ok_or_else(|| SessionError::invalid(url.as_str(), "missing file id"))?
            .to_string();
        let file = PixelDrainFile {
            id,
            api: self.api.clone(),
        };
        Ok(DownloadSession::new(
            url,
            FILE_ADAPTER,
            SessionKind::Standalone(Box::new(file)),
        ))
    }
}

/// `pixeldrain.com/l/<id>`: a list that separates into file sessions.
#[derive(Debug, Clone)]
pub struct PixelDrainListAdapter {
    api: PixelDrainApi,
}

impl PixelDrainListAdapter {
    /// Adapter against the public API.
    #[must_use]
    pub fn new(engine: BatchEngine) -> Self {
        Self::with_api_base(engine, PIXELDRAIN_API_BASE)
    }

    /// Adapter against an alternative API root.
    #[must_use]
    pub fn with_api_base(engine: BatchEngine, base: &str) -> Self {
        Self {
            api: PixelDrainApi {
                engine,
                base: Arc::from(base.trim_end_matches('/')),
            },
        }
    }
}

impl Adapter for PixelDrainListAdapter {
    fn name(&self) -> &'static str {
        LIST_ADAPTER
    }

    fn is_valid_for(&self, url: &CanonicalUrl) -> bool {
        host_ends_with(url.url(), HOST) && first_segment(url.url()) == Some("l")
    }

    fn from_url(&self, url: CanonicalUrl) -> Result<DownloadSession, SessionError> {
        let id = id_after_prefix(url.url(), "l")
            .ok_or_else(|| SessionError::invalid(url.as_str(), "missing list id"))?
            .to_string();
        let list = PixelDrainList {
            id,
            api: self.api.clone(),
        };
        Ok(DownloadSession::new(
            url,
            LIST_ADAPTER,
            SessionKind::Composite(Box::new(list)),
        ))
    }
}

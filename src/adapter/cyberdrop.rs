use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::Adapter;
use crate::download::{BatchEngine, DownloadTask, sanitize_filename};
use crate::resolver::CanonicalUrl;
use crate::resolver::utils::{first_segment, host_is, id_after_prefix};
use crate::session::{DownloadSession, SessionError, SessionKind, StandaloneResource};

/// Public API root.
pub const CYBERDROP_API_BASE: &str = "https://api.cyberdrop.me";

const ADAPTER: &str = "cyberdrop-file";

#[derive(Debug, Deserialize)]
struct FileInfo {
    auth_url: String,
    name: String,
    size: u64,
}

#[derive(Debug, Deserialize)]
struct AuthorizedLink {
    url: String,
}

struct CyberDropFile {
    id: String,
    engine: BatchEngine,
    api_base: Arc<str>,
}

#[async_trait]
impl StandaloneResource for CyberDropFile {
    fn resource_id(&self) -> String {
        format!("cyberdrop_file_{}", self.id)
    }

    /// Looks up the file, exchanges its auth URL for a signed link, and
    /// downloads it with the advertised size checked.
    #[instrument(skip(self, dir), fields(id = %self.id))]
    async fn download_to_directory(&self, dir: &Path) -> Result<PathBuf, SessionError> {
        let client = self.engine.client();
        let info: FileInfo = client
            .get_json(&format!("{}/api/file/info/{}", self.api_base, self.id))
            .await?;
        let link: AuthorizedLink = client.get_json(&info.auth_url).await?;
        debug!(name = %info.name, size = info.size, "signed link obtained");

        let dest = dir.join(sanitize_filename(&info.name));
        let task = DownloadTask::new(link.url, dest.clone()).with_expected_size(info.size);
        self.engine.run_task(task).await?;
        Ok(dest)
    }
}

/// `cyberdrop.me/f/<id>`: a single file, size verified.
#[derive(Debug, Clone)]
pub struct CyberDropFileAdapter {
    engine: BatchEngine,
    api_base: Arc<str>,
}

impl CyberDropFileAdapter {
    /// Adapter against the public API.
    #[must_use]
    pub fn new(engine: BatchEngine) -> Self {
        Self::with_api_base(engine, CYBERDROP_API_BASE)
    }

    /// Adapter against an alternative API root.
    #[must_use]
    pub fn with_api_base(engine: BatchEngine, base: &str) -> Self {
        Self {
            engine,
            api_base: Arc::from(base.trim_end_matches('/')),
        }
    }
}

impl Adapter for CyberDropFileAdapter {
    fn name(&self) -> &'static str {
        ADAPTER
    }

    fn is_valid_for(&self, url: &CanonicalUrl) -> bool {
        host_is(url.url(), &["cyberdrop", "me"]) && first_segment(url.url()) == Some("f")
    }

    fn from_url(&self, url: CanonicalUrl) -> Result<DownloadSession, SessionError> {
        let id = id_after_prefix(url.url(), "f")
            .ok_or_else(|| SessionError::invalid(url.as_str(), "missing file id"))?
            .to_string();
        let file = CyberDropFile {
            id,
            engine: self.engine.clone(),
            api_base: Arc::clone(&self.api_base),
        };
        Ok(DownloadSession::new(url, ADAPTER, SessionKind::Standalone(Box::new(file))))
    }
}

//! Dropbox shared files (`/scl/fi/...`) and folders (`/scl/fo/...`).
//!
//! Both download straight from the share link with `dl=1`; no API token or
//! page scraping is involved. Files take their name from the
//! `Content-Disposition` the server sends. Folders arrive as one zip archive
//! that is unpacked into the target directory.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::Adapter;
use crate::download::{BatchEngine, BatchSummary, DownloadTask};
use crate::resolver::CanonicalUrl;
use crate::resolver::utils::{host_ends_with, path_segments};
use crate::session::{
    DirectoryResource, DownloadSession, SessionError, SessionKind, StandaloneResource,
};

/// Public website root.
pub const DROPBOX_BASE: &str = "https://www.dropbox.com";

const HOST: &[&str] = &["dropbox", "com"];
const FILE_ADAPTER: &str = "dropbox-file";
const FOLDER_ADAPTER: &str = "dropbox-folder";
const ARCHIVE_NAME: &str = "folder.zip";

/// Non-empty segments after `/scl/<kind>/`, or `None` for other paths.
fn share_segments<'a>(url: &'a Url, kind: &str) -> Option<Vec<&'a str>> {
    match path_segments(url).as_slice() {
        ["scl", k, rest @ ..] if *k == kind => {
            Some(rest.iter().copied().filter(|s| !s.is_empty()).collect())
        }
        _ => None,
    }
}

fn is_share(url: &CanonicalUrl, kind: &str) -> bool {
    host_ends_with(url.url(), HOST) && share_segments(url.url(), kind).is_some()
}

/// The share link rebased onto `base`, query kept, `dl` forced to `1`.
fn direct_link(base: &str, page: &Url) -> Result<String, SessionError> {
    let mut link = Url::parse(&format!("{base}{}", page.path()))
        .map_err(|e| SessionError::invalid(page.as_str(), e.to_string()))?;
    let kept: Vec<(String, String)> = page
        .query_pairs()
        .filter(|(key, _)| key.as_ref() != "dl")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    link.query_pairs_mut()
        .extend_pairs(kept)
        .append_pair("dl", "1");
    Ok(link.into())
}

/// Resource id and download link for a share URL of `kind`.
fn share_parts(base: &str, url: &CanonicalUrl, kind: &str) -> Result<(String, String), SessionError> {
    let segments = share_segments(url.url(), kind)
        .filter(|segments| !segments.is_empty())
        .ok_or_else(|| SessionError::invalid(url.as_str(), "missing share id"))?;
    Ok((segments.join("_"), direct_link(base, url.url())?))
}

struct DropboxFile {
    id: String,
    link: String,
    engine: BatchEngine,
}

#[async_trait]
impl StandaloneResource for DropboxFile {
    fn resource_id(&self) -> String {
        format!("dropbox_file_{}", self.id)
    }

    #[instrument(skip(self, dir), fields(id = %self.id))]
    async fn download_to_directory(&self, dir: &Path) -> Result<PathBuf, SessionError> {
        let (path, bytes) = self.engine.run_into_dir(&self.link, dir).await?;
        debug!(path = %path.display(), bytes, "shared file saved");
        Ok(path)
    }
}

struct DropboxFolder {
    id: String,
    link: String,
    engine: BatchEngine,
}

#[async_trait]
impl DirectoryResource for DropboxFolder {
    fn resource_id(&self) -> String {
        format!("dropbox_folder_{}", self.id)
    }

    /// Fetches the folder archive into a scratch directory, then unpacks it
    /// into `dir`. The summary counts the extracted files.
    #[instrument(skip(self, dir), fields(id = %self.id))]
    async fn download_to_directory(&self, dir: &Path) -> Result<BatchSummary, SessionError> {
        let scratch =
            tempfile::TempDir::new().map_err(|e| SessionError::io(std::env::temp_dir(), e))?;
        let archive = scratch.path().join(ARCHIVE_NAME);
        self.engine
            .run_batch(vec![DownloadTask::new(self.link.clone(), archive.clone())])
            .await?;

        let target = dir.to_path_buf();
        let source = archive.clone();
        let summary = tokio::task::spawn_blocking(move || extract_archive(&source, &target))
            .await
            .map_err(|e| SessionError::archive(&archive, e))??;
        info!(files = summary.completed, bytes = summary.bytes, "folder archive extracted");
        Ok(summary)
    }
}

/// Unpacks every entry of `archive` below `dir`.
///
/// Entries whose names would land outside `dir` (absolute paths, `..`) are
/// skipped.
fn extract_archive(archive: &Path, dir: &Path) -> Result<BatchSummary, SessionError> {
    let file = std::fs::File::open(archive).map_err(|e| SessionError::io(archive, e))?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| SessionError::archive(archive, e))?;

    let mut summary = BatchSummary::default();
    for index in 0..zip.len() {
        let mut entry = zip
            .by_index(index)
            .map_err(|e| SessionError::archive(archive, e))?;
        let Some(relative) = entry.enclosed_name().map(Path::to_path_buf) else {
            warn!(entry = entry.name(), "skipping archive entry outside the target directory");
            continue;
        };

        let out = dir.join(relative);
        if entry.is_dir() {
            std::fs::create_dir_all(&out).map_err(|e| SessionError::io(&out, e))?;
            continue;
        }
        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SessionError::io(parent, e))?;
        }
        let mut file = std::fs::File::create(&out).map_err(|e| SessionError::io(&out, e))?;
        let bytes = io::copy(&mut entry, &mut file).map_err(|e| SessionError::io(&out, e))?;
        summary.completed += 1;
        summary.bytes += bytes;
    }
    Ok(summary)
}

/// `dropbox.com/scl/fi/<id>/<name>`: a single shared file.
#[derive(Debug, Clone)]
pub struct DropboxFileAdapter {
    engine: BatchEngine,
    base: Arc<str>,
}

impl DropboxFileAdapter {
    /// Adapter against the public website.
    #[must_use]
    pub fn new(engine: BatchEngine) -> Self {
        Self::with_base(engine, DROPBOX_BASE)
    }

    /// Adapter that downloads from an alternative root.
    #[must_use]
    pub fn with_base(engine: BatchEngine, base: &str) -> Self {
        Self {
            engine,
            base: Arc::from(base.trim_end_matches('/')),
        }
    }
}

impl Adapter for DropboxFileAdapter {
    fn name(&self) -> &'static str {
        FILE_ADAPTER
    }

    fn is_valid_for(&self, url: &CanonicalUrl) -> bool {
        is_share(url, "fi")
    }

    fn from_url(&self, url: CanonicalUrl) -> Result<DownloadSession, SessionError> {
        let (id, link) = share_parts(&self.base, &url, "fi")?;
        let file = DropboxFile {
            id,
            link,
            engine: self.engine.clone(),
        };
        Ok(DownloadSession::new(url, FILE_ADAPTER, SessionKind::Standalone(Box::new(file))))
    }
}

/// `dropbox.com/scl/fo/<id>/<key>`: a shared folder, fetched as a zip.
#[derive(Debug, Clone)]
pub struct DropboxFolderAdapter {
    engine: BatchEngine,
    base: Arc<str>,
}

impl DropboxFolderAdapter {
    /// Adapter against the public website.
    #[must_use]
    pub fn new(engine: BatchEngine) -> Self {
        Self::with_base(engine, DROPBOX_BASE)
    }

    /// Adapter that downloads from an alternative root.
    #[must_use]
    pub fn with_base(engine: BatchEngine, base: &str) -> Self {
        Self {
            engine,
            base: Arc::from(base.trim_end_matches('/')),
        }
    }
}

impl Adapter for DropboxFolderAdapter {
    fn name(&self) -> &'static str {
        FOLDER_ADAPTER
    }

    fn is_valid_for(&self, url: &CanonicalUrl) -> bool {
        is_share(url, "fo")
    }

    fn from_url(&self, url: CanonicalUrl) -> Result<DownloadSession, SessionError> {
        let (id, link) = share_parts(&self.base, &url, "fo")?;
        let folder = DropboxFolder {
            id,
            link,
            engine: self.engine.clone(),
        };
        Ok(DownloadSession::new(url, FOLDER_ADAPTER, SessionKind::Directory(Box::new(folder))))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::{Cursor, Write};

    use tempfile::TempDir;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, ResponseTemplate};
    use zip::CompressionMethod;
    use zip::write::FileOptions;

    use super::*;
    use crate::download::{ClientOptions, HttpClient, RetryPolicy};
    use crate::test_support::socket_guard::start_mock_server_or_skip;

    fn engine() -> BatchEngine {
        let client = HttpClient::with_options(ClientOptions {
            retry: RetryPolicy::no_retry(),
            ..ClientOptions::default()
        })
        .unwrap();
        BatchEngine::new(client, 2).unwrap()
    }

    fn canonical(s: &str) -> CanonicalUrl {
        CanonicalUrl::new(Url::parse(s).unwrap())
    }

    fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        writer.add_directory("/", options).unwrap();
        for (name, body) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(body).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_predicates_and_identity() {
        let file = DropboxFileAdapter::new(engine());
        let folder = DropboxFolderAdapter::new(engine());
        let shared_file = canonical("https://www.dropbox.com/scl/fi/abc123/report.pdf?rlkey=k&dl=0");
        let shared_folder = canonical("https://dropbox.com/scl/fo/xyz/h?rlkey=r");

        assert!(file.is_valid_for(&shared_file));
        assert!(!folder.is_valid_for(&shared_file));
        assert!(folder.is_valid_for(&shared_folder));
        assert!(!file.is_valid_for(&canonical("https://www.dropbox.com/s/abc/report.pdf")));
        assert!(!file.is_valid_for(&canonical("https://dropbox.example.org/scl/fi/abc")));

        let session = file.from_url(shared_file).unwrap();
        assert_eq!(session.identity(), "dropbox_file_abc123_report.pdf");
        assert_eq!(session.kind().name(), "standalone");
        let session = folder.from_url(shared_folder).unwrap();
        assert_eq!(session.identity(), "dropbox_folder_xyz_h");
        assert_eq!(session.kind().name(), "directory");
    }

    #[test]
    fn test_direct_link_forces_download_flag() {
        let page = Url::parse("https://dropbox.com/scl/fi/abc/a.txt?rlkey=k&dl=0").unwrap();
        assert_eq!(
            direct_link(DROPBOX_BASE, &page).unwrap(),
            "https://www.dropbox.com/scl/fi/abc/a.txt?rlkey=k&dl=1"
        );
        let bare = Url::parse("https://www.dropbox.com/scl/fo/xyz/h").unwrap();
        assert_eq!(
            direct_link(DROPBOX_BASE, &bare).unwrap(),
            "https://www.dropbox.com/scl/fo/xyz/h?dl=1"
        );
    }

    #[test]
    fn test_missing_share_id_is_invalid() {
        let err = DropboxFileAdapter::new(engine())
            .from_url(canonical("https://www.dropbox.com/scl/fi/"))
            .unwrap_err();
        assert!(matches!(err, SessionError::Invalid { .. }));
    }

    #[tokio::test]
    async fn test_file_is_named_from_content_disposition() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/scl/fi/abc123/report.pdf"))
            .and(query_param("rlkey", "k"))
            .and(query_param("dl", "1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Disposition", r#"attachment; filename="Q3 report.pdf""#)
                    .set_body_bytes(b"%PDF-1.7".to_vec()),
            )
            .mount(&server)
            .await;

        let adapter = DropboxFileAdapter::with_base(engine(), &server.uri());
        let out = TempDir::new().unwrap();

        let session = adapter
            .from_url(canonical("https://www.dropbox.com/scl/fi/abc123/report.pdf?rlkey=k&dl=0"))
            .unwrap();
        let summary = session.download_to_directory(out.path()).await.unwrap();
        assert_eq!(summary, BatchSummary { completed: 1, bytes: 8 });
        assert_eq!(std::fs::read(out.path().join("Q3 report.pdf")).unwrap(), b"%PDF-1.7");

        let dest = out.path().join("copies/renamed.pdf");
        assert_eq!(session.download_to_file(&dest).await.unwrap(), 8);
        assert_eq!(std::fs::read(dest).unwrap(), b"%PDF-1.7");
    }

    #[tokio::test]
    async fn test_folder_archive_is_extracted() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        let archive = zip_bytes(&[
            ("notes.txt", b"hello"),
            ("photos/cat.jpg", b"meow!!"),
            ("../escape.txt", b"nope"),
        ]);
        Mock::given(method("GET"))
            .and(path("/scl/fo/xyz/h"))
            .and(query_param("dl", "1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Disposition", r#"attachment; filename="shared.zip""#)
                    .set_body_bytes(archive),
            )
            .mount(&server)
            .await;

        let session = DropboxFolderAdapter::with_base(engine(), &server.uri())
            .from_url(canonical("https://www.dropbox.com/scl/fo/xyz/h?rlkey=r"))
            .unwrap();
        let root = TempDir::new().unwrap();
        let out = root.path().join("folder");

        let summary = session.download_to_directory(&out).await.unwrap();
        assert_eq!(summary, BatchSummary { completed: 2, bytes: 11 });
        assert_eq!(std::fs::read(out.join("notes.txt")).unwrap(), b"hello");
        assert_eq!(std::fs::read(out.join("photos/cat.jpg")).unwrap(), b"meow!!");
        assert!(!root.path().join("escape.txt").exists());
        assert!(!out.join(ARCHIVE_NAME).exists());
    }

    #[tokio::test]
    async fn test_corrupt_folder_archive_is_reported() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/scl/fo/bad/h"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"not a zip".to_vec()))
            .mount(&server)
            .await;

        let session = DropboxFolderAdapter::with_base(engine(), &server.uri())
            .from_url(canonical("https://www.dropbox.com/scl/fo/bad/h"))
            .unwrap();
        let out = TempDir::new().unwrap();
        let err = session.download_to_directory(out.path()).await.unwrap_err();
        assert!(matches!(err, SessionError::Archive { .. }));
    }
}

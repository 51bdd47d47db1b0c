//! GoFile folders (`gofile.io/d/<id>`).
//!
//! Listing a folder needs a guest account token and the "website token"
//! embedded in the site's JavaScript bundle. Both are fetched lazily and
//! shared by every session built from one adapter: the account token is
//! refreshed after [`TOKEN_TTL`], the website token is fetched once.
//! Downloads carry the account token as an `accountToken` cookie.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{AUTHORIZATION, COOKIE, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, instrument, warn};

use super::Adapter;
use crate::download::{BatchEngine, BatchSummary, Checksum, DownloadTask, join_sanitized};
use crate::resolver::CanonicalUrl;
use crate::resolver::utils::{first_segment, host_ends_with, id_after_prefix};
use crate::session::{DirectoryResource, DownloadSession, SessionError, SessionKind};

/// Public API root.
pub const GOFILE_API_BASE: &str = "https://api.gofile.io";

/// Website root serving the JavaScript bundle.
pub const GOFILE_SITE_BASE: &str = "https://gofile.io";

/// How long a guest account token is reused.
pub const TOKEN_TTL: Duration = Duration::from_secs(60 * 60);

const ADAPTER: &str = "gofile-folder";

#[allow(clippy::expect_used)]
static WEBSITE_TOKEN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\s*wt\s*:\s*(\S+?)\s*\}").expect("website token regex is valid")
});

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct Account {
    token: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum NodeType {
    Folder,
    File,
    #[serde(other)]
    Other,
}

/// One entry of a contents listing; folders nest their children by id.
#[derive(Debug, Deserialize)]
struct Node {
    id: String,
    #[serde(rename = "type")]
    node_type: NodeType,
    name: String,
    #[serde(default, rename = "parentFolder")]
    parent_folder: Option<String>,
    #[serde(default)]
    children: HashMap<String, Node>,
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    md5: Option<String>,
}

/// A file in a folder tree, with its path relative to the folder root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct RemoteFile {
    segments: Vec<String>,
    link: String,
    size: Option<u64>,
    md5: Option<String>,
}

#[derive(Debug)]
struct CachedToken {
    value: String,
    fetched: Instant,
}

#[derive(Debug)]
struct GoFileApi {
    engine: BatchEngine,
    api_base: String,
    site_base: String,
    account: Mutex<Option<CachedToken>>,
    website_token: OnceCell<String>,
}

impl GoFileApi {
    async fn guest_token(&self) -> Result<String, SessionError> {
        let mut cached = self.account.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.fetched.elapsed() < TOKEN_TTL) {
            return Ok(token.value.clone());
        }

        let url = format!("{}/accounts", self.api_base);
        let envelope: Envelope<Account> = self.engine.client().post_json(&url).await?;
        let account = expect_ok(&url, envelope)?;
        info!("obtained guest account token");
        *cached = Some(CachedToken {
            value: account.token.clone(),
            fetched: Instant::now(),
        });
        Ok(account.token)
    }

    async fn website_token(&self) -> Result<&str, SessionError> {
        let token = self
            .website_token
            .get_or_try_init(|| async {
                let url = format!("{}/dist/js/alljs.js", self.site_base);
                let script = self.engine.client().get_text(&url).await?;
                let raw = WEBSITE_TOKEN_PATTERN
                    .captures(&script)
                    .and_then(|caps| caps.get(1))
                    .ok_or_else(|| SessionError::invalid(&url, "website token not found in script"))?;
                serde_json::from_str::<String>(raw.as_str())
                    .map_err(|e| SessionError::invalid(&url, format!("malformed website token: {e}")))
            })
            .await?;
        Ok(token.as_str())
    }

    #[instrument(skip(self, account_token))]
    async fn list_files(&self, id: &str, account_token: &str) -> Result<Vec<RemoteFile>, SessionError> {
        let wt = self.website_token().await?;
        let url = format!(
            "{}/contents/{id}?wt={}",
            self.api_base,
            urlencoding::encode(wt)
        );
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, header_value(&url, &format!("Bearer {account_token}"))?);

        let envelope: Envelope<serde_json::Value> =
            self.engine.client().get_json_with_headers(&url, headers).await?;
        let root: Node = parse_data(&url, expect_ok(&url, envelope)?)?;
        let files = extract_files(&root);
        debug!(files = files.len(), "folder listed");
        Ok(files)
    }
}

fn expect_ok<T>(url: &str, envelope: Envelope<T>) -> Result<T, SessionError> {
    if envelope.status != "ok" {
        return Err(SessionError::invalid(url, format!("API status {}", envelope.status)));
    }
    envelope
        .data
        .ok_or_else(|| SessionError::invalid(url, "API response has no data"))
}

fn parse_data<T: DeserializeOwned>(url: &str, data: serde_json::Value) -> Result<T, SessionError> {
    serde_json::from_value(data)
        .map_err(|e| SessionError::invalid(url, format!("unexpected API payload: {e}")))
}

fn header_value(url: &str, value: &str) -> Result<HeaderValue, SessionError> {
    HeaderValue::from_str(value)
        .map_err(|_| SessionError::invalid(url, "token is not a valid header value"))
}

/// Flattens a contents tree into files with their relative paths, sorted.
///
/// A node's path is its parent folder's path plus its own name. A node whose
/// parent is absent or unknown is a root: a root folder contributes no
/// segment, a root file is just its name.
fn extract_files(root: &Node) -> Vec<RemoteFile> {
    let mut index: HashMap<&str, &Node> = HashMap::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        index.insert(node.id.as_str(), node);
        if node.node_type == NodeType::Folder {
            stack.extend(node.children.values());
        }
    }

    let mut files: Vec<RemoteFile> = index
        .values()
        .filter(|node| node.node_type == NodeType::File)
        .filter_map(|node| {
            let Some(link) = node.link.clone() else {
                warn!(id = %node.id, name = %node.name, "file without download link, skipping");
                return None;
            };
            Some(RemoteFile {
                segments: node_segments(node, &index),
                link,
                size: node.size,
                md5: node.md5.clone(),
            })
        })
        .collect();
    files.sort();
    files
}

fn node_segments(node: &Node, index: &HashMap<&str, &Node>) -> Vec<String> {
    let mut names = Vec::new();
    let mut seen = HashSet::new();
    let mut current = node;
    while seen.insert(current.id.as_str()) {
        match current.parent_folder.as_deref().and_then(|id| index.get(id).copied()) {
            Some(parent) => {
                names.push(current.name.clone());
                current = parent;
            }
            None => {
                if current.node_type == NodeType::File {
                    names.push(current.name.clone());
                }
                break;
            }
        }
    }
    names.reverse();
    names
}

struct GoFileFolder {
    id: String,
    api: Arc<GoFileApi>,
}

#[async_trait]
impl DirectoryResource for GoFileFolder {
    fn resource_id(&self) -> String {
        format!("gofile_folder_{}", self.id)
    }

    #[instrument(skip(self, dir), fields(id = %self.id))]
    async fn download_to_directory(&self, dir: &Path) -> Result<BatchSummary, SessionError> {
        let token = self.api.guest_token().await?;
        let files = self.api.list_files(&self.id, &token).await?;
        let cookie = header_value(&self.id, &format!("accountToken={token}"))?;

        let tasks = files
            .into_iter()
            .map(|file| {
                let mut task = DownloadTask::new(file.link, join_sanitized(dir, &file.segments))
                    .with_header(COOKIE, cookie.clone());
                if let Some(size) = file.size {
                    task = task.with_expected_size(size);
                }
                if let Some(md5) = file.md5 {
                    task = task.with_checksum(Checksum::Md5(md5));
                }
                task
            })
            .collect();
        Ok(self.api.engine.run_batch(tasks).await?)
    }
}

/// `gofile.io/d/<id>`: a folder tree, MD5 verified, layout preserved.
#[derive(Debug, Clone)]
pub struct GoFileFolderAdapter {
    api: Arc<GoFileApi>,
}

impl GoFileFolderAdapter {
    /// Adapter against the public API and website.
    #[must_use]
    pub fn new(engine: BatchEngine) -> Self {
        Self::with_bases(engine, GOFILE_API_BASE, GOFILE_SITE_BASE)
    }

    /// Adapter against alternative API and website roots.
    #[must_use]
    pub fn with_bases(engine: BatchEngine, api_base: &str, site_base: &str) -> Self {
        Self {
            api: Arc::new(GoFileApi {
                engine,
                api_base: api_base.trim_end_matches('/').to_string(),
                site_base: site_base.trim_end_matches('/').to_string(),
                account: Mutex::new(None),
                website_token: OnceCell::new(),
            }),
        }
    }
}

impl Adapter for GoFileFolderAdapter {
    fn name(&self) -> &'static str {
        ADAPTER
    }

    fn is_valid_for(&self, url: &CanonicalUrl) -> bool {
        host_ends_with(url.url(), &["gofile", "io"]) && first_segment(url.url()) == Some("d")
    }

    fn from_url(&self, url: CanonicalUrl) -> Result<DownloadSession, SessionError> {
        let id = id_after_prefix(url.url(), "d")
            .ok_or_else(|| SessionError::invalid(url.as_str(), "missing folder id"))?
            .to_string();
        let folder = GoFileFolder {
            id,
            api: Arc::clone(&self.api),
        };
        Ok(DownloadSession::new(url, ADAPTER, SessionKind::Directory(Box::new(folder))))
    }
}

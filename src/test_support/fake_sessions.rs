//! In-memory session resources for unit tests.

#![allow(clippy::unwrap_used)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use url::Url;

use crate::download::BatchSummary;
use crate::resolver::CanonicalUrl;
use crate::session::{
    CompositeResource, DownloadSession, SessionError, SessionKind, StandaloneResource,
};

/// Canonical URL on the fake host.
pub fn fake_url(id: &str) -> CanonicalUrl {
    CanonicalUrl::new(Url::parse(&format!("https://fake.test/{id}")).unwrap())
}

/// Standalone resource that writes a fixed set of files.
pub struct FakeStandalone {
    id: String,
    files: Vec<(String, Vec<u8>)>,
    /// Number of `resource_id` calls.
    pub id_calls: Arc<AtomicUsize>,
    /// Directories passed to `download_to_directory`.
    pub seen_dirs: Arc<Mutex<Vec<PathBuf>>>,
}

impl FakeStandalone {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            files: Vec::new(),
            id_calls: Arc::new(AtomicUsize::new(0)),
            seen_dirs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_file(mut self, name: &str, body: &[u8]) -> Self {
        self.files.push((name.to_string(), body.to_vec()));
        self
    }

    pub fn into_session(self) -> DownloadSession {
        let url = fake_url(&self.id);
        DownloadSession::new(url, "fake", SessionKind::Standalone(Box::new(self)))
    }
}

#[async_trait]
impl StandaloneResource for FakeStandalone {
    fn resource_id(&self) -> String {
        self.id_calls.fetch_add(1, Ordering::SeqCst);
        format!("fake_file_{}", self.id)
    }

    async fn download_to_directory(&self, dir: &Path) -> Result<PathBuf, SessionError> {
        self.seen_dirs.lock().unwrap().push(dir.to_path_buf());
        let mut last = dir.to_path_buf();
        for (name, body) in &self.files {
            last = dir.join(name);
            tokio::fs::write(&last, body)
                .await
                .map_err(|e| SessionError::io(&last, e))?;
        }
        Ok(last)
    }
}

/// Shape of a fake session tree.
#[derive(Debug, Clone)]
pub enum FakeNode {
    Leaf(String),
    Composite(String, Vec<FakeNode>),
}

impl FakeNode {
    pub fn leaf(id: &str) -> Self {
        Self::Leaf(id.to_string())
    }

    pub fn composite(id: &str, children: Vec<FakeNode>) -> Self {
        Self::Composite(id.to_string(), children)
    }
}

struct FakeComposite {
    id: String,
    children: Vec<FakeNode>,
}

#[async_trait]
impl CompositeResource for FakeComposite {
    fn resource_id(&self) -> String {
        format!("fake_group_{}", self.id)
    }

    async fn separate(&self) -> Result<Vec<DownloadSession>, SessionError> {
        Ok(self.children.iter().map(fake_session).collect())
    }

    async fn download_to_directory(&self, _dir: &Path) -> Result<BatchSummary, SessionError> {
        Ok(BatchSummary::default())
    }
}

/// Builds a session tree from `node`.
pub fn fake_session(node: &FakeNode) -> DownloadSession {
    match node {
        FakeNode::Leaf(id) => FakeStandalone::new(id).into_session(),
        FakeNode::Composite(id, children) => DownloadSession::new(
            fake_url(id),
            "fake",
            SessionKind::Composite(Box::new(FakeComposite {
                id: id.clone(),
                children: children.clone(),
            })),
        ),
    }
}

//! Bounded-concurrency batch downloads with per-task error isolation.
//!
//! [`BatchEngine::run_batch`] fans a list of [`DownloadTask`]s out over Tokio
//! tasks, bounded by a semaphore. Each worker streams its file, verifies it,
//! and reports the outcome over an mpsc channel to a single coordinator that
//! owns the error list and progress counts. A failing task never stops its
//! siblings; the call returns only once every task is terminal.
//!
//! # Example
//!
//! ```no_run
//! use netdrive_core::download::{BatchEngine, DownloadTask, HttpClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = BatchEngine::new(HttpClient::new()?, 4)?;
//! let tasks = vec![
//!     DownloadTask::new("https://example.com/a.bin", "./out/a.bin"),
//!     DownloadTask::new("https://example.com/b.bin", "./out/b.bin").with_expected_size(1024),
//! ];
//! let summary = engine.run_batch(tasks).await?;
//! println!("{} files, {} bytes", summary.completed, summary.bytes);
//! # Ok(())
//! # }
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::integrity::{self, Checksum, IntegrityError};
use super::{DownloadError, HttpClient};

/// Minimum allowed concurrency value.
const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
const MAX_CONCURRENCY: usize = 100;

/// Default number of simultaneous transfers.
pub const DEFAULT_CONCURRENCY: usize = 12;

/// Error type for engine construction.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },
}

/// One file to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    /// Source URL.
    pub url: String,
    /// Destination file path.
    pub destination: PathBuf,
    /// Advertised size, checked after the transfer.
    pub expected_size: Option<u64>,
    /// Advertised checksum, checked after the transfer.
    pub checksum: Option<Checksum>,
    /// Extra request headers (auth cookies and the like).
    pub headers: HeaderMap,
}

impl DownloadTask {
    /// Creates a task with no integrity expectations.
    pub fn new(url: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            destination: destination.into(),
            expected_size: None,
            checksum: None,
            headers: HeaderMap::new(),
        }
    }

    /// Sets the expected size in bytes.
    #[must_use]
    pub fn with_expected_size(mut self, size: u64) -> Self {
        self.expected_size = Some(size);
        self
    }

    /// Sets the expected checksum.
    #[must_use]
    pub fn with_checksum(mut self, checksum: Checksum) -> Self {
        self.checksum = Some(checksum);
        self
    }

    /// Adds a request header sent with the transfer.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// Why a single task failed.
#[derive(Debug, Error)]
pub enum TaskError {
    /// Transfer failed.
    #[error(transparent)]
    Download(#[from] DownloadError),

    /// Transfer finished but the file did not verify.
    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    /// Destination directory could not be created.
    #[error("cannot create directory {path}: {source}")]
    CreateDir {
        /// Directory that failed.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// An earlier task of the same batch already writes this destination.
    #[error("destination {path} is already claimed by another task in this batch")]
    DuplicateDestination {
        /// The contested path.
        path: PathBuf,
    },

    /// The batch was cancelled before this task finished.
    #[error("download of {url} cancelled")]
    Cancelled {
        /// Source URL of the cancelled task.
        url: String,
    },

    /// The worker panicked.
    #[error("download worker for {url} panicked")]
    Panicked {
        /// Source URL of the task.
        url: String,
    },
}

/// A failed task together with what it was doing.
#[derive(Debug)]
pub struct TaskFailure {
    /// Source URL.
    pub url: String,
    /// Destination the task was writing.
    pub destination: PathBuf,
    /// The recorded error.
    pub error: TaskError,
}

/// Aggregate error produced after a batch with at least one failure.
#[derive(Debug, Error)]
#[error("{count} of {total} download task(s) failed")]
pub struct BatchError {
    /// Number of failed tasks.
    pub count: usize,
    /// Number of tasks in the batch.
    pub total: usize,
    /// Per-task failures, in task order.
    pub errors: Vec<TaskFailure>,
}

/// Outcome of a fully successful batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Number of files written.
    pub completed: usize,
    /// Total bytes written.
    pub bytes: u64,
}

/// Progress sink for batch runs.
///
/// Batches announce their size through `batch_started` and report from their
/// coordinator. Single transfers ([`BatchEngine::run_task`],
/// [`BatchEngine::run_into_dir`]) report completion from the calling task but
/// never call `batch_started`: whoever schedules them registers the total.
/// Implementations must tolerate concurrent calls. All methods default to
/// no-ops.
pub trait BatchProgress: Send + Sync {
    /// A batch of `total` tasks is starting.
    fn batch_started(&self, _total: usize) {}

    /// A task finished successfully.
    fn task_completed(&self, _url: &str, _bytes: u64) {}

    /// A task failed.
    fn task_failed(&self, _url: &str, _error: &TaskError) {}

    /// Every task is terminal.
    fn batch_finished(&self, _completed: usize, _failed: usize) {}
}

/// Progress sink that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl BatchProgress for NoProgress {}

/// Runs download tasks with a concurrency bound.
///
/// Clones share the same semaphore, progress sink and cancellation token, so
/// the bound holds across every batch started from one engine (including
/// batches started by directory and composite sessions).
#[derive(Clone)]
pub struct BatchEngine {
    client: HttpClient,
    semaphore: Arc<Semaphore>,
    concurrency: usize,
    progress: Arc<dyn BatchProgress>,
    cancel: CancellationToken,
}

impl BatchEngine {
    /// Creates an engine running at most `concurrency` transfers at once.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] if the value is outside
    /// the valid range (1-100).
    #[instrument(level = "debug", skip(client))]
    pub fn new(client: HttpClient, concurrency: usize) -> Result<Self, EngineError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(EngineError::InvalidConcurrency { value: concurrency });
        }
        debug!(
            concurrency,
            max_attempts = client.retry_policy().max_attempts(),
            "creating batch engine"
        );
        Ok(Self {
            client,
            semaphore: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            progress: Arc::new(NoProgress),
            cancel: CancellationToken::new(),
        })
    }

    /// Sets the progress sink used by [`run_batch`](Self::run_batch) and
    /// [`run_task`](Self::run_task).
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn BatchProgress>) -> Self {
        self.progress = progress;
        self
    }

    /// Sets the token that cancels every batch run through this engine.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Returns the configured concurrency limit.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Returns the transport used by workers.
    #[must_use]
    pub fn client(&self) -> &HttpClient {
        &self.client
    }

    /// Runs every task to completion.
    ///
    /// # Errors
    ///
    /// Returns [`BatchError`] with the failure count and per-task errors if
    /// any task failed. Failed tasks leave their destination as it was.
    /// A task whose destination an earlier task already claims fails with
    /// [`TaskError::DuplicateDestination`] without being sent.
    pub async fn run_batch(&self, tasks: Vec<DownloadTask>) -> Result<BatchSummary, BatchError> {
        self.run_batch_with(tasks, self.progress.as_ref(), &self.cancel)
            .await
    }

    /// Runs one task under the engine's concurrency bound, progress sink and
    /// cancellation token, creating its parent directory first.
    ///
    /// # Errors
    ///
    /// Returns the [`TaskError`] that ended the task; the destination is left
    /// untouched on failure.
    #[instrument(skip_all, fields(url = %task.url))]
    pub async fn run_task(&self, task: DownloadTask) -> Result<u64, TaskError> {
        let result = async {
            create_parent(&task.destination).await?;
            let _permit = self.acquire(&task.url).await?;
            execute_task(&self.client, &task, &self.cancel).await
        }
        .await;
        self.report(&task.url, result.as_ref().map(|bytes| *bytes));
        result
    }

    /// Downloads `url` into `dir` (created if missing) under the name the
    /// server announces, with the same bound, sink and token as
    /// [`run_task`](Self::run_task).
    ///
    /// # Errors
    ///
    /// Returns the [`TaskError`] that ended the transfer; nothing is written
    /// to `dir` on failure.
    #[instrument(skip(self, dir), fields(dir = %dir.display()))]
    pub async fn run_into_dir(&self, url: &str, dir: &Path) -> Result<(PathBuf, u64), TaskError> {
        let result = async {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|source| TaskError::CreateDir {
                    path: dir.to_path_buf(),
                    source,
                })?;
            let _permit = self.acquire(url).await?;
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => Err(TaskError::Cancelled { url: url.to_string() }),
                result = self.client.download_into_dir(url, dir) => Ok(result?),
            }
        }
        .await;
        self.report(url, result.as_ref().map(|(_, bytes)| *bytes));
        result
    }

    async fn acquire(&self, url: &str) -> Result<OwnedSemaphorePermit, TaskError> {
        let permit = tokio::select! {
            biased;
            () = self.cancel.cancelled() => None,
            permit = Arc::clone(&self.semaphore).acquire_owned() => permit.ok(),
        };
        permit.ok_or_else(|| TaskError::Cancelled { url: url.to_string() })
    }

    fn report(&self, url: &str, result: Result<u64, &TaskError>) {
        match result {
            Ok(bytes) => self.progress.task_completed(url, bytes),
            Err(error) => {
                warn!(url = %url, error = %error, "download task failed");
                self.progress.task_failed(url, error);
            }
        }
    }

    /// Runs every task to completion, reporting progress and honouring `cancel`.
    ///
    /// Cancelled tasks are recorded as [`TaskError::Cancelled`] failures.
    ///
    /// # Errors
    ///
    /// As [`run_batch`](Self::run_batch).
    #[instrument(skip_all, fields(tasks = tasks.len(), concurrency = self.concurrency))]
    pub async fn run_batch_with(
        &self,
        tasks: Vec<DownloadTask>,
        progress: &dyn BatchProgress,
        cancel: &CancellationToken,
    ) -> Result<BatchSummary, BatchError> {
        let total = tasks.len();
        progress.batch_started(total);
        info!("starting batch");

        let meta: Vec<(String, PathBuf)> = tasks
            .iter()
            .map(|task| (task.url.clone(), task.destination.clone()))
            .collect();
        let mut failures: Vec<(usize, TaskError)> = Vec::new();

        let failed_dirs = create_parent_dirs(&tasks).await;
        let mut claimed: HashSet<PathBuf> = HashSet::with_capacity(total);
        let mut pending = Vec::with_capacity(total);
        for (index, task) in tasks.into_iter().enumerate() {
            let rejected = if !claimed.insert(task.destination.clone()) {
                Some(TaskError::DuplicateDestination {
                    path: task.destination.clone(),
                })
            } else {
                task.destination
                    .parent()
                    .and_then(|p| failed_dirs.get(p))
                    .map(|source| TaskError::CreateDir {
                        path: task.destination.parent().map(Path::to_path_buf).unwrap_or_default(),
                        source: std::io::Error::new(source.kind(), source.to_string()),
                    })
            };
            match rejected {
                Some(error) => {
                    warn!(url = %task.url, error = %error, "download task rejected");
                    progress.task_failed(&task.url, &error);
                    failures.push((index, error));
                }
                None => pending.push((index, task)),
            }
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<(usize, Result<u64, TaskError>)>();

        let spawn_all = async move {
            let mut handles = Vec::with_capacity(pending.len());
            for (index, task) in pending {
                let permit = tokio::select! {
                    biased;
                    () = cancel.cancelled() => None,
                    permit = Arc::clone(&self.semaphore).acquire_owned() => permit.ok(),
                };
                // The semaphore is never closed, so `None` only means cancellation.
                let Some(permit) = permit else {
                    let _ = tx.send((index, Err(TaskError::Cancelled { url: task.url })));
                    continue;
                };

                let tx = tx.clone();
                let client = self.client.clone();
                let cancel = cancel.clone();
                handles.push((
                    index,
                    tokio::spawn(async move {
                        let _permit = permit;
                        let result = execute_task(&client, &task, &cancel).await;
                        let _ = tx.send((index, result));
                    }),
                ));
            }
            handles
        };

        let collect = async {
            let mut completed = 0usize;
            let mut bytes = 0u64;
            let mut reported = vec![false; total];
            let mut errors = Vec::new();
            while let Some((index, result)) = rx.recv().await {
                reported[index] = true;
                let url = &meta[index].0;
                match result {
                    Ok(written) => {
                        completed += 1;
                        bytes += written;
                        progress.task_completed(url, written);
                    }
                    Err(error) => {
                        warn!(url = %url, error = %error, "download task failed");
                        progress.task_failed(url, &error);
                        errors.push((index, error));
                    }
                }
            }
            (completed, bytes, reported, errors)
        };

        let (handles, (completed, bytes, reported, errors)) = tokio::join!(spawn_all, collect);
        failures.extend(errors);

        for (index, handle) in handles {
            if let Err(join_error) = handle.await {
                let url = &meta[index].0;
                warn!(url = %url, error = %join_error, "download task panicked");
                if !reported[index] {
                    let error = TaskError::Panicked { url: url.clone() };
                    progress.task_failed(url, &error);
                    failures.push((index, error));
                }
            }
        }

        let failed = failures.len();
        progress.batch_finished(completed, failed);
        info!(completed, failed, bytes, "batch complete");

        if failures.is_empty() {
            return Ok(BatchSummary { completed, bytes });
        }

        failures.sort_by_key(|(index, _)| *index);
        let errors = failures
            .into_iter()
            .map(|(index, error)| {
                let (url, destination) = meta[index].clone();
                TaskFailure {
                    url,
                    destination,
                    error,
                }
            })
            .collect();
        Err(BatchError {
            count: failed,
            total,
            errors,
        })
    }
}

impl fmt::Debug for BatchEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchEngine")
            .field("client", &self.client)
            .field("concurrency", &self.concurrency)
            .field("available_permits", &self.semaphore.available_permits())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Downloads one task into a temp file beside its destination, verifies it,
/// then renames it into place.
///
/// A failed or cancelled task removes only its own temp file; whatever was
/// at the destination before stays untouched. The destination's parent
/// directory must already exist.
///
/// # Errors
///
/// Returns the [`TaskError`] that ended the task.
#[instrument(skip(client, cancel), fields(url = %task.url, dest = %task.destination.display()))]
pub async fn execute_task(
    client: &HttpClient,
    task: &DownloadTask,
    cancel: &CancellationToken,
) -> Result<u64, TaskError> {
    let work = async {
        let partial = client
            .fetch_partial(&task.url, &task.destination, &task.headers)
            .await?;
        integrity::verify(partial.path(), task.expected_size, task.checksum.as_ref()).await?;
        Ok::<_, TaskError>(partial.commit().await?)
    };

    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(TaskError::Cancelled { url: task.url.clone() }),
        result = work => result,
    }
}

async fn create_parent(path: &Path) -> Result<(), TaskError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| TaskError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
    }
    Ok(())
}

/// Creates every distinct destination parent once, returning the failures.
async fn create_parent_dirs(tasks: &[DownloadTask]) -> HashMap<PathBuf, std::io::Error> {
    let parents: HashSet<&Path> = tasks
        .iter()
        .filter_map(|task| task.destination.parent())
        .filter(|parent| !parent.as_os_str().is_empty())
        .collect();

    let mut failed = HashMap::new();
    for parent in parents {
        if let Err(error) = tokio::fs::create_dir_all(parent).await {
            warn!(path = %parent.display(), error = %error, "cannot create destination directory");
            failed.insert(parent.to_path_buf(), error);
        }
    }
    failed
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, ResponseTemplate};

    use super::*;
    use crate::download::{ClientOptions, RetryPolicy};
    use crate::test_support::socket_guard::start_mock_server_or_skip;

    fn test_client() -> HttpClient {
        HttpClient::with_options(ClientOptions {
            retry: RetryPolicy::no_retry(),
            ..ClientOptions::default()
        })
        .unwrap()
    }

    #[derive(Default)]
    struct RecordingProgress {
        events: Mutex<Vec<String>>,
    }

    impl BatchProgress for RecordingProgress {
        fn batch_started(&self, total: usize) {
            self.events.lock().unwrap().push(format!("start:{total}"));
        }
        fn task_completed(&self, _url: &str, bytes: u64) {
            self.events.lock().unwrap().push(format!("ok:{bytes}"));
        }
        fn task_failed(&self, _url: &str, _error: &TaskError) {
            self.events.lock().unwrap().push("fail".to_string());
        }
        fn batch_finished(&self, completed: usize, failed: usize) {
            self.events
                .lock()
                .unwrap()
                .push(format!("finish:{completed}:{failed}"));
        }
    }

    #[test]
    fn test_engine_new_valid_concurrency() {
        for value in [1, DEFAULT_CONCURRENCY, 100] {
            let engine = BatchEngine::new(test_client(), value).unwrap();
            assert_eq!(engine.concurrency(), value);
        }
    }

    #[test]
    fn test_engine_new_invalid_concurrency() {
        for value in [0, 101] {
            let err = BatchEngine::new(test_client(), value).unwrap_err();
            assert!(matches!(err, EngineError::InvalidConcurrency { value: v } if v == value));
            assert!(err.to_string().contains("between 1 and 100"));
        }
    }

    #[test]
    fn test_default_concurrency_constant() {
        assert_eq!(DEFAULT_CONCURRENCY, 12);
    }

    #[test]
    fn test_batch_error_display_reports_count() {
        let err = BatchError {
            count: 2,
            total: 5,
            errors: Vec::new(),
        };
        assert_eq!(err.to_string(), "2 of 5 download task(s) failed");
    }

    #[tokio::test]
    async fn test_empty_batch_succeeds() {
        let engine = BatchEngine::new(test_client(), 2).unwrap();
        let summary = engine.run_batch(Vec::new()).await.unwrap();
        assert_eq!(summary, BatchSummary::default());
    }

    #[tokio::test]
    async fn test_cancelled_batch_records_every_task() {
        let dir = TempDir::new().unwrap();
        let engine = BatchEngine::new(test_client(), 2).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let tasks = (0..3)
            .map(|i| {
                DownloadTask::new(
                    format!("http://127.0.0.1:9/{i}"),
                    dir.path().join(format!("{i}.bin")),
                )
            })
            .collect();
        let err = engine
            .run_batch_with(tasks, &NoProgress, &cancel)
            .await
            .unwrap_err();

        assert_eq!(err.count, 3);
        assert!(
            err.errors
                .iter()
                .all(|f| matches!(f.error, TaskError::Cancelled { .. }))
        );
    }

    #[tokio::test]
    async fn test_batch_is_not_short_circuited_by_failure() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        for i in [0, 1, 3, 4] {
            Mock::given(method("GET"))
                .and(path(format!("/file{i}")))
                .respond_with(ResponseTemplate::new(200).set_body_bytes(format!("body{i}")))
                .mount(&server)
                .await;
        }
        Mock::given(method("GET"))
            .and(path("/file2"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let tasks: Vec<_> = (0..5)
            .map(|i| {
                DownloadTask::new(
                    format!("{}/file{i}", server.uri()),
                    dir.path().join("nested").join(format!("{i}.txt")),
                )
            })
            .collect();
        let progress = RecordingProgress::default();
        let engine = BatchEngine::new(test_client(), 2).unwrap();

        let err = engine
            .run_batch_with(tasks, &progress, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.count, 1);
        assert_eq!(err.total, 5);
        assert!(err.errors[0].url.ends_with("/file2"));
        assert!(matches!(
            err.errors[0].error,
            TaskError::Download(DownloadError::HttpStatus { status: 404, .. })
        ));
        for i in [0, 1, 3, 4] {
            let written = std::fs::read_to_string(dir.path().join("nested").join(format!("{i}.txt")))
                .unwrap();
            assert_eq!(written, format!("body{i}"));
        }
        assert!(!dir.path().join("nested").join("2.txt").exists());

        let events = progress.events.lock().unwrap();
        assert_eq!(events.first().unwrap(), "start:5");
        assert_eq!(events.last().unwrap(), "finish:4:1");
        assert_eq!(events.iter().filter(|e| e.starts_with("ok:")).count(), 4);
    }

    #[tokio::test]
    async fn test_integrity_failure_removes_file() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/short"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello".to_vec()))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("short.bin");
        let task = DownloadTask::new(format!("{}/short", server.uri()), &dest).with_expected_size(3);

        let err = execute_task(&test_client(), &task, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            TaskError::Integrity(IntegrityError::SizeMismatch {
                expected: 3,
                actual: 5,
                ..
            })
        ));
        assert!(!dest.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_checksum_verified_task_succeeds() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/hello"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello".to_vec()))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let task = DownloadTask::new(format!("{}/hello", server.uri()), dir.path().join("h.txt"))
            .with_expected_size(5)
            .with_checksum(Checksum::Md5("5d41402abc4b2a76b9719d911017c592".to_string()));

        let engine = BatchEngine::new(test_client(), 1).unwrap();
        let summary = engine.run_batch(vec![task]).await.unwrap();
        assert_eq!(summary, BatchSummary { completed: 1, bytes: 5 });
    }

    #[tokio::test]
    async fn test_run_task_creates_parent_and_reports_progress() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/one"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"abc".to_vec()))
            .mount(&server)
            .await;

        let progress = Arc::new(RecordingProgress::default());
        let engine = BatchEngine::new(test_client(), 1)
            .unwrap()
            .with_progress(Arc::clone(&progress) as Arc<dyn BatchProgress>);
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("a/b/one.bin");

        let bytes = engine
            .run_task(DownloadTask::new(format!("{}/one", server.uri()), &dest))
            .await
            .unwrap();

        assert_eq!(bytes, 3);
        assert!(dest.exists());
        // Single transfers leave the total to whoever schedules them.
        assert_eq!(*progress.events.lock().unwrap(), vec!["ok:3"]);
    }

    #[tokio::test]
    async fn test_failed_task_keeps_existing_destination() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/corrupt"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"garbage".to_vec()))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("movie.mkv");
        std::fs::write(&dest, b"earlier run").unwrap();

        for (route, size) in [("/gone", None), ("/corrupt", Some(3))] {
            let mut task = DownloadTask::new(format!("{}{route}", server.uri()), &dest);
            task.expected_size = size;
            execute_task(&test_client(), &task, &CancellationToken::new())
                .await
                .unwrap_err();
            assert_eq!(std::fs::read(&dest).unwrap(), b"earlier run");
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_destination_is_rejected_up_front() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/first"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"first".to_vec()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/second"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"second".to_vec()))
            .expect(0)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("same.txt");
        let tasks = vec![
            DownloadTask::new(format!("{}/first", server.uri()), &dest),
            DownloadTask::new(format!("{}/second", server.uri()), &dest),
        ];
        let progress = RecordingProgress::default();
        let engine = BatchEngine::new(test_client(), 2).unwrap();

        let err = engine
            .run_batch_with(tasks, &progress, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.count, 1);
        assert!(err.errors[0].url.ends_with("/second"));
        assert!(matches!(
            err.errors[0].error,
            TaskError::DuplicateDestination { ref path } if *path == dest
        ));
        assert_eq!(std::fs::read(&dest).unwrap(), b"first");
        assert_eq!(progress.events.lock().unwrap().last().unwrap(), "finish:1:1");
    }

    #[tokio::test]
    async fn test_run_into_dir_names_file_from_response() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/share/xyz"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Disposition", r#"attachment; filename="report.pdf""#)
                    .set_body_bytes(b"%PDF".to_vec()),
            )
            .mount(&server)
            .await;

        let progress = Arc::new(RecordingProgress::default());
        let engine = BatchEngine::new(test_client(), 1)
            .unwrap()
            .with_progress(Arc::clone(&progress) as Arc<dyn BatchProgress>);
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("fresh");

        let (saved, bytes) = engine
            .run_into_dir(&format!("{}/share/xyz", server.uri()), &target)
            .await
            .unwrap();

        assert_eq!(saved, target.join("report.pdf"));
        assert_eq!(bytes, 4);
        assert_eq!(*progress.events.lock().unwrap(), vec!["ok:4"]);
    }

    #[tokio::test]
    async fn test_run_task_on_cancelled_engine() {
        let cancel = CancellationToken::new();
        let engine = BatchEngine::new(test_client(), 1)
            .unwrap()
            .with_cancellation(cancel.clone());
        cancel.cancel();

        let dir = TempDir::new().unwrap();
        let err = engine
            .run_task(DownloadTask::new("http://127.0.0.1:9/x", dir.path().join("x")))
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::Cancelled { .. }));
        assert!(format!("{engine:?}").contains("cancelled: true"));
    }
}

//! Transport, batch engine and integrity verification.
//!
//! # Features
//!
//! - Streaming downloads into a `.part` temp file, renamed into place on success
//! - Automatic retry on a fixed set of retryable HTTP statuses
//! - Rotating browser User-Agent
//! - Bounded-concurrency batches with per-task error isolation
//! - Size and SHA-256/MD5 verification in 1 MiB chunks

mod client;
pub mod constants;
mod engine;
mod error;
mod filename;
pub mod integrity;
mod retry;

pub use client::{ClientOptions, HttpClient, PartialDownload, RedirectHop};
pub use engine::{
    BatchEngine, BatchError, BatchProgress, BatchSummary, DEFAULT_CONCURRENCY, DownloadTask,
    EngineError, NoProgress, TaskError, TaskFailure, execute_task,
};
pub use error::DownloadError;
pub use integrity::{Checksum, HashAlgorithm, IntegrityError};
pub use retry::{DEFAULT_MAX_RETRIES, FailureType, RetryDecision, RetryPolicy, classify_error};

pub(crate) use filename::{join_sanitized, sanitize_filename};

//! Post-download integrity verification.
//!
//! Files are read in [`HASH_CHUNK_SIZE`] chunks so memory use stays flat no
//! matter how large the download is. A digest is only computed when the
//! caller supplies an expected checksum.

use std::fmt;
use std::path::{Path, PathBuf};

use md5::Md5;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tracing::{debug, instrument};

use super::constants::HASH_CHUNK_SIZE;

/// Digest algorithms a host may publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    /// SHA-256 (PixelDrain).
    Sha256,
    /// MD5 (GoFile).
    Md5,
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sha256 => f.write_str("sha256"),
            Self::Md5 => f.write_str("md5"),
        }
    }
}

/// An expected checksum: algorithm plus hex digest.
///
/// Hex comparison is case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Checksum {
    /// Expected SHA-256 hex digest.
    Sha256(String),
    /// Expected MD5 hex digest.
    Md5(String),
}

impl Checksum {
    /// Algorithm used to produce this checksum.
    #[must_use]
    pub fn algorithm(&self) -> HashAlgorithm {
        match self {
            Self::Sha256(_) => HashAlgorithm::Sha256,
            Self::Md5(_) => HashAlgorithm::Md5,
        }
    }

    /// Expected hex digest as published.
    #[must_use]
    pub fn hex(&self) -> &str {
        match self {
            Self::Sha256(hex) | Self::Md5(hex) => hex,
        }
    }

    fn matches(&self, actual_hex: &str) -> bool {
        self.hex().trim().eq_ignore_ascii_case(actual_hex)
    }
}

/// Verification failures.
#[derive(Debug, Error)]
pub enum IntegrityError {
    /// File length differs from the advertised size.
    #[error("size mismatch for {path}: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        /// Verified file.
        path: PathBuf,
        /// Advertised size.
        expected: u64,
        /// Size on disk.
        actual: u64,
    },

    /// Digest differs from the advertised checksum.
    #[error("{algorithm} mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Verified file.
        path: PathBuf,
        /// Digest algorithm.
        algorithm: HashAlgorithm,
        /// Advertised hex digest.
        expected: String,
        /// Computed hex digest.
        actual: String,
    },

    /// The file could not be read.
    #[error("cannot read {path} for verification: {source}")]
    Io {
        /// File being read.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl IntegrityError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Checks `path` against the expected size and checksum.
///
/// Size is checked first; when both are absent the call is a no-op.
///
/// # Errors
///
/// Returns [`IntegrityError::SizeMismatch`] or [`IntegrityError::ChecksumMismatch`]
/// carrying both values, or [`IntegrityError::Io`] if the file cannot be read.
#[instrument(level = "debug", skip(expected_checksum), fields(path = %path.display()))]
pub async fn verify(
    path: &Path,
    expected_size: Option<u64>,
    expected_checksum: Option<&Checksum>,
) -> Result<(), IntegrityError> {
    if let Some(expected) = expected_size {
        let actual = tokio::fs::metadata(path)
            .await
            .map_err(|e| IntegrityError::io(path, e))?
            .len();
        if actual != expected {
            return Err(IntegrityError::SizeMismatch {
                path: path.to_path_buf(),
                expected,
                actual,
            });
        }
    }

    if let Some(checksum) = expected_checksum {
        let actual = compute_checksum(path, checksum.algorithm()).await?;
        if !checksum.matches(&actual) {
            return Err(IntegrityError::ChecksumMismatch {
                path: path.to_path_buf(),
                algorithm: checksum.algorithm(),
                expected: checksum.hex().to_string(),
                actual,
            });
        }
    }

    debug!("integrity ok");
    Ok(())
}

/// Computes the lowercase hex digest of the file at `path`.
///
/// # Errors
///
/// Returns [`IntegrityError::Io`] if the file cannot be opened or read.
pub async fn compute_checksum(
    path: &Path,
    algorithm: HashAlgorithm,
) -> Result<String, IntegrityError> {
    match algorithm {
        HashAlgorithm::Sha256 => hash_file::<Sha256>(path).await,
        HashAlgorithm::Md5 => hash_file::<Md5>(path).await,
    }
}

async fn hash_file<D: Digest>(path: &Path) -> Result<String, IntegrityError> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| IntegrityError::io(path, e))?;
    let mut hasher = D::new();
    let mut buffer = vec![0u8; HASH_CHUNK_SIZE];

    loop {
        let read = file
            .read(&mut buffer)
            .await
            .map_err(|e| IntegrityError::io(path, e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

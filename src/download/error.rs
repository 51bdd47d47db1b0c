//! Error types for the transport layer.
//!
//! This module defines structured errors for HTTP requests and streamed
//! downloads, providing context-rich messages for debugging and user feedback.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while talking to a file host.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error requesting {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout requesting {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} requesting {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// File system error during download (create file, write, rename, etc.)
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// A redirect response carried no usable `Location` header.
    #[error("HTTP {status} from {url} without a usable Location header")]
    MissingLocation {
        /// The URL that answered with a redirect.
        url: String,
        /// The redirect status code.
        status: u16,
    },

    /// Redirect chain exceeded the hop limit.
    #[error("too many redirects ({hops}) following {url}")]
    TooManyRedirects {
        /// The URL the chain started from.
        url: String,
        /// Number of hops followed before giving up.
        hops: usize,
    },

    /// Response body could not be decoded as the expected JSON document.
    #[error("unexpected response body from {url}: {source}")]
    Decode {
        /// The URL whose body failed to decode.
        url: String,
        /// The underlying decode error.
        #[source]
        source: reqwest::Error,
    },
}

impl DownloadError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a missing-Location error for a redirect response.
    pub fn missing_location(url: impl Into<String>, status: u16) -> Self {
        Self::MissingLocation {
            url: url.into(),
            status,
        }
    }

    /// Creates a redirect-limit error.
    pub fn too_many_redirects(url: impl Into<String>, hops: usize) -> Self {
        Self::TooManyRedirects {
            url: url.into(),
            hops,
        }
    }

    /// Creates a body decode error.
    pub fn decode(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Decode {
            url: url.into(),
            source,
        }
    }

    /// Builds a network/timeout error from a failed `send()`.
    pub(crate) fn from_send(url: &str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::timeout(url)
        } else {
            Self::network(url, source)
        }
    }
}

// No `From<reqwest::Error>` / `From<std::io::Error>`: every variant needs the
// url or path the source errors don't carry.

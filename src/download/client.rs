//! HTTP transport shared by resolvers, adapters and the batch engine.
//!
//! This module provides the [`HttpClient`] struct which wraps two pooled
//! `reqwest` clients (one following redirects, one not), applies the retry
//! policy to every request, rotates the User-Agent, and streams bodies to
//! disk in chunks. Bodies land in a `.part` temp file beside the destination
//! and are renamed into place only once the caller commits them.

use std::borrow::Cow;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{CONTENT_DISPOSITION, HeaderMap, LOCATION, USER_AGENT};
use reqwest::{Client, RequestBuilder, Response, redirect};
use serde::de::DeserializeOwned;
use tempfile::TempPath;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::DownloadError;
use super::constants::{CONNECT_TIMEOUT_SECS, MAX_REDIRECT_HOPS, PART_SUFFIX, READ_TIMEOUT_SECS};
use super::filename::{
    FALLBACK_FILENAME, filename_from_url, parse_content_disposition, sanitize_filename,
};
use super::retry::{RetryDecision, RetryPolicy, classify_error};
use crate::user_agent;

/// Transport configuration.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// TCP/TLS connect timeout.
    pub connect_timeout: Duration,
    /// Timeout applied to each read while a response is in flight.
    pub read_timeout: Duration,
    /// Retry behaviour for retryable statuses and transient network errors.
    pub retry: RetryPolicy,
    /// Pick a random browser User-Agent per request instead of the tool agent.
    pub rotate_user_agent: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(READ_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
            rotate_user_agent: true,
        }
    }
}

/// Result of a single redirect lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectHop {
    /// The server answered 3xx; the `Location` target joined against the request URL.
    Redirect(Url),
    /// The server answered with a final (2xx) response at this URL.
    Final(Url),
}

/// HTTP client with retries, user agent rotation and streamed downloads.
///
/// Create once and share (it is cheap to clone); connection pools are reused.
///
/// # Example
///
/// ```no_run
/// use netdrive_core::download::HttpClient;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = HttpClient::new()?;
/// let (path, bytes) = client
///     .download_into_dir("https://example.com/file.bin", Path::new("./downloads"))
///     .await?;
/// println!("wrote {bytes} bytes to {}", path.display());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    no_redirect: Client,
    retry: RetryPolicy,
    rotate_user_agent: bool,
    tool_agent: String,
}

impl HttpClient {
    /// Creates a client with default options.
    ///
    /// # Errors
    ///
    /// Returns the `reqwest` error if the TLS backend cannot be initialised.
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_options(ClientOptions::default())
    }

    /// Creates a client from explicit options.
    ///
    /// # Errors
    ///
    /// Returns the `reqwest` error if the TLS backend cannot be initialised.
    #[instrument(level = "debug", skip(options), fields(rotate = options.rotate_user_agent))]
    pub fn with_options(options: ClientOptions) -> Result<Self, reqwest::Error> {
        let client = base_builder(&options).build()?;
        let no_redirect = base_builder(&options)
            .redirect(redirect::Policy::none())
            .build()?;
        Ok(Self {
            client,
            no_redirect,
            retry: options.retry,
            rotate_user_agent: options.rotate_user_agent,
            tool_agent: user_agent::default_user_agent(),
        })
    }

    /// Returns the retry policy applied to every request.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Sends a GET and returns the successful response.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` for invalid URLs, network failures that survive
    /// retrying, and non-success statuses.
    pub async fn get(&self, url: &str) -> Result<Response, DownloadError> {
        self.send_with_retry(url, |client| client.get(url)).await
    }

    /// GETs `url` and decodes the JSON body.
    ///
    /// # Errors
    ///
    /// As [`get`](Self::get), plus [`DownloadError::Decode`] for a malformed body.
    #[instrument(level = "debug", skip(self))]
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, DownloadError> {
        self.get_json_with_headers(url, HeaderMap::new()).await
    }

    /// GETs `url` with extra headers and decodes the JSON body.
    ///
    /// # Errors
    ///
    /// As [`get_json`](Self::get_json).
    pub async fn get_json_with_headers<T: DeserializeOwned>(
        &self,
        url: &str,
        headers: HeaderMap,
    ) -> Result<T, DownloadError> {
        let response = self
            .send_with_retry(url, |client| client.get(url).headers(headers.clone()))
            .await?;
        response
            .json::<T>()
            .await
            .map_err(|e| DownloadError::decode(url, e))
    }

    /// POSTs an empty body to `url` and decodes the JSON answer.
    ///
    /// # Errors
    ///
    /// As [`get_json`](Self::get_json).
    #[instrument(level = "debug", skip(self))]
    pub async fn post_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, DownloadError> {
        let response = self.send_with_retry(url, |client| client.post(url)).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| DownloadError::decode(url, e))
    }

    /// GETs `url` and returns the body as text.
    ///
    /// # Errors
    ///
    /// As [`get`](Self::get); a body that fails mid-read is a network error.
    pub async fn get_text(&self, url: &str) -> Result<String, DownloadError> {
        let response = self.get(url).await?;
        response
            .text()
            .await
            .map_err(|e| DownloadError::from_send(url, e))
    }

    /// Issues one HEAD without following redirects.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::MissingLocation`] when a 3xx carries no usable
    /// `Location`, and the usual transport errors otherwise.
    #[instrument(level = "debug", skip(self))]
    pub async fn head_redirect(&self, url: &str) -> Result<RedirectHop, DownloadError> {
        let request_url = parse_url(url)?;
        let response = self
            .send_with_retry_on(&self.no_redirect, url, |client| client.head(url))
            .await?;

        let status = response.status();
        if !status.is_redirection() {
            return Ok(RedirectHop::Final(response.url().clone()));
        }

        let target = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|location| request_url.join(location).ok())
            .ok_or_else(|| DownloadError::missing_location(url, status.as_u16()))?;
        debug!(from = %url, to = %target, status = status.as_u16(), "redirect hop");
        Ok(RedirectHop::Redirect(target))
    }

    /// Follows HEAD redirects until a non-redirect answer, returning its URL.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::TooManyRedirects`] after
    /// [`MAX_REDIRECT_HOPS`](super::constants::MAX_REDIRECT_HOPS) hops, plus
    /// any error from [`head_redirect`](Self::head_redirect).
    #[instrument(level = "debug", skip(self))]
    pub async fn follow_redirects(&self, url: &str) -> Result<Url, DownloadError> {
        let mut current = url.to_string();
        for _ in 0..MAX_REDIRECT_HOPS {
            match self.head_redirect(&current).await? {
                RedirectHop::Redirect(next) => current = next.into(),
                RedirectHop::Final(done) => return Ok(done),
            }
        }
        Err(DownloadError::too_many_redirects(url, MAX_REDIRECT_HOPS))
    }

    /// Streams `url` into a temp file beside `dest` and returns it unpublished.
    ///
    /// The parent directory must exist. Nothing is written to `dest` itself
    /// until [`PartialDownload::commit`]; dropping the handle or failing
    /// mid-transfer removes only the temp file.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` for request failures, non-success statuses,
    /// stream interruptions and filesystem errors.
    #[instrument(skip(self, dest, headers), fields(dest = %dest.display()))]
    pub async fn fetch_partial(
        &self,
        url: &str,
        dest: &Path,
        headers: &HeaderMap,
    ) -> Result<PartialDownload, DownloadError> {
        let response = self
            .send_with_retry(url, |client| client.get(url).headers(headers.clone()))
            .await?;
        write_partial(response, url, dest).await
    }

    /// Downloads `url` into `dir`, naming the file from `Content-Disposition`
    /// or the URL path. Returns the final path and the bytes written.
    ///
    /// An existing file of the same name is replaced only once the transfer
    /// has completed.
    ///
    /// # Errors
    ///
    /// As [`fetch_partial`](Self::fetch_partial).
    #[instrument(skip(self, dir), fields(dir = %dir.display()))]
    pub async fn download_into_dir(
        &self,
        url: &str,
        dir: &Path,
    ) -> Result<(PathBuf, u64), DownloadError> {
        let response = self.get(url).await?;
        let dest = dir.join(response_filename(&response));
        let bytes = write_partial(response, url, &dest).await?.commit().await?;
        Ok((dest, bytes))
    }

    async fn send_with_retry<F>(&self, url: &str, build: F) -> Result<Response, DownloadError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        self.send_with_retry_on(&self.client, url, build).await
    }

    async fn send_with_retry_on<F>(
        &self,
        client: &Client,
        url: &str,
        build: F,
    ) -> Result<Response, DownloadError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        parse_url(url)?;
        let mut attempt = 1;
        loop {
            let request = build(client).header(USER_AGENT, self.pick_user_agent());
            let error = match send_once(request, url).await {
                Ok(response) => return Ok(response),
                Err(error) => error,
            };

            match self.retry.should_retry(classify_error(&error), attempt) {
                RetryDecision::Retry {
                    delay,
                    attempt: next,
                } => {
                    warn!(
                        url,
                        error = %error,
                        attempt,
                        delay_ms = delay.as_millis(),
                        "request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt = next;
                }
                RetryDecision::DoNotRetry { reason } => {
                    debug!(url, reason = %reason, "giving up on request");
                    return Err(error);
                }
            }
        }
    }

    fn pick_user_agent(&self) -> &str {
        if self.rotate_user_agent {
            user_agent::random_browser_user_agent()
        } else {
            &self.tool_agent
        }
    }
}

fn base_builder(options: &ClientOptions) -> reqwest::ClientBuilder {
    Client::builder()
        .connect_timeout(options.connect_timeout)
        .read_timeout(options.read_timeout)
        .gzip(true)
}

fn parse_url(url: &str) -> Result<Url, DownloadError> {
    Url::parse(url).map_err(|_| DownloadError::invalid_url(url))
}

async fn send_once(request: RequestBuilder, url: &str) -> Result<Response, DownloadError> {
    let response = request
        .send()
        .await
        .map_err(|e| DownloadError::from_send(url, e))?;
    let status = response.status();
    if status.is_success() || status.is_redirection() {
        Ok(response)
    } else {
        Err(DownloadError::http_status(url, status.as_u16()))
    }
}

/// A completed transfer held in a temp file next to its destination.
///
/// Dropping it without calling [`commit`](Self::commit) deletes the temp
/// file, so a failed or cancelled task never touches the destination.
#[derive(Debug)]
pub struct PartialDownload {
    temp: TempPath,
    destination: PathBuf,
    bytes: u64,
}

impl PartialDownload {
    /// Where the bytes currently live.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.temp
    }

    /// The path the file is published to on commit.
    #[must_use]
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Bytes written.
    #[must_use]
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Renames the temp file onto the destination, replacing any file there.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Io`] if the rename fails; the temp file is
    /// removed in that case.
    pub async fn commit(self) -> Result<u64, DownloadError> {
        let Self {
            temp,
            destination,
            bytes,
        } = self;
        tokio::fs::rename(&temp, &destination)
            .await
            .map_err(|e| DownloadError::io(&destination, e))?;
        // The rename consumed the temp path; nothing is left to clean up.
        let _ = temp.keep();
        info!(path = %destination.display(), bytes, "download complete");
        Ok(bytes)
    }
}

async fn write_partial(
    response: Response,
    url: &str,
    dest: &Path,
) -> Result<PartialDownload, DownloadError> {
    let dir = dest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = dest
        .file_name()
        .map_or(Cow::Borrowed(FALLBACK_FILENAME), OsStr::to_string_lossy);
    let prefix = format!(".{name}.");
    let (file, temp) = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(PART_SUFFIX)
        .tempfile_in(dir)
        .map_err(|e| DownloadError::io(dest, e))?
        .into_parts();

    // On error `temp` is dropped here, which removes the partial file.
    let bytes = stream_to_file(File::from_std(file), response, url, &temp).await?;
    debug!(temp = %temp.display(), bytes, "transfer finished");
    Ok(PartialDownload {
        temp,
        destination: dest.to_path_buf(),
        bytes,
    })
}

/// Streams the response body to `file`, returning bytes written.
async fn stream_to_file(
    file: File,
    response: Response,
    url: &str,
    path: &Path,
) -> Result<u64, DownloadError> {
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut written: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| DownloadError::from_send(url, e))?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(path, e))?;
        written += chunk.len() as u64;
    }

    writer.flush().await.map_err(|e| DownloadError::io(path, e))?;
    Ok(written)
}

fn response_filename(response: &Response) -> String {
    response
        .headers()
        .get(CONTENT_DISPOSITION)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_content_disposition)
        .map(|name| sanitize_filename(&name))
        .or_else(|| filename_from_url(response.url()))
        .unwrap_or_else(|| FALLBACK_FILENAME.to_string())
}

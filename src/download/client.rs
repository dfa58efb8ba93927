//! HTTP client wrapper performing one retrieval attempt.
//!
//! [`HttpClient::download_once`] issues a single GET with a bounded total
//! timeout, enforces the size ceiling, resolves the filename and streams the
//! body to a `.part` file that is renamed into place only when complete.
//! Retrying is the caller's business (see [`super::RetryingFetcher`]).

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::CONTENT_LENGTH;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, instrument};
use url::Url;

use super::constants::{
    CHUNK_SIZE_BYTES, CONNECT_TIMEOUT_SECS, MAX_FILE_SIZE_BYTES, REQUEST_TIMEOUT_SECS,
};
use super::error::DownloadError;
use super::filename::{fallback_filename, resolve_filename};

/// Distinguishes concurrent `.part` files written by this process.
static PART_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Size guard and write buffering for one transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferLimits {
    /// Largest accepted file, declared or streamed.
    pub max_file_size: u64,
    /// Write buffer capacity.
    pub chunk_size: usize,
}

impl Default for TransferLimits {
    fn default() -> Self {
        Self {
            max_file_size: MAX_FILE_SIZE_BYTES,
            chunk_size: CHUNK_SIZE_BYTES,
        }
    }
}

/// A file that was fully written and moved into place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedFile {
    /// Final location.
    pub path: PathBuf,
    /// Bytes written.
    pub bytes: u64,
}

/// HTTP client for streaming downloads.
///
/// Created once per run and shared, so connections are pooled.
///
/// # Example
///
/// ```no_run
/// use bookdl_core::download::HttpClient;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = HttpClient::new()?;
/// let saved = client
///     .download_once("https://example.com/book.pdf", Path::new("./downloads/Book"), "PDF")
///     .await?;
/// println!("Downloaded: {}", saved.path.display());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    limits: TransferLimits,
}

impl HttpClient {
    /// Creates a client with the default timeout and limits.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::ClientBuild`] if the TLS backend fails to
    /// initialize.
    pub fn new() -> Result<Self, DownloadError> {
        Self::with_settings(
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
            TransferLimits::default(),
        )
    }

    /// Creates a client with an explicit total timeout and transfer limits.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::ClientBuild`] if the client cannot be built.
    pub fn with_settings(timeout: Duration, limits: TransferLimits) -> Result<Self, DownloadError> {
        let connect_timeout = timeout.min(Duration::from_secs(CONNECT_TIMEOUT_SECS));
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(timeout)
            .gzip(true)
            .user_agent(default_user_agent())
            .build()
            .map_err(DownloadError::client_build)?;
        Ok(Self { client, limits })
    }

    /// Returns the transfer limits in effect.
    #[must_use]
    pub fn limits(&self) -> TransferLimits {
        self.limits
    }

    /// Performs exactly one retrieval of `url` into `dest_dir`.
    ///
    /// The destination directory is created only once the response has
    /// passed the status and declared-size checks, so a rejected link leaves
    /// no trace on disk. A file with the same name is replaced.
    ///
    /// # Errors
    ///
    /// - [`DownloadError::InvalidUrl`] if `url` does not parse
    /// - [`DownloadError::Network`] / [`DownloadError::Timeout`] on transport failure
    /// - [`DownloadError::HttpStatus`] on any non-2xx status
    /// - [`DownloadError::TooLarge`] if declared or streamed size exceeds the ceiling
    /// - [`DownloadError::Io`] if the directory or file cannot be written
    #[instrument(skip(self, dest_dir), fields(url = %url, dest = %dest_dir.display()))]
    pub async fn download_once(
        &self,
        url: &str,
        dest_dir: &Path,
        label: &str,
    ) -> Result<SavedFile, DownloadError> {
        let parsed = Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;

        let response = self.send_request(parsed, url).await?;

        let declared = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        if let Some(declared) = declared
            && declared > self.limits.max_file_size
        {
            return Err(DownloadError::too_large(
                url,
                declared,
                self.limits.max_file_size,
            ));
        }

        let final_url = response.url().clone();
        let resolved = resolve_filename(response.headers(), &final_url)
            .unwrap_or_else(|| fallback_filename(label, response.headers(), &final_url));
        debug!(filename = %resolved.name, source = ?resolved.source, "resolved filename");

        tokio::fs::create_dir_all(dest_dir)
            .await
            .map_err(|e| DownloadError::io(dest_dir, e))?;

        let final_path = dest_dir.join(&resolved.name);
        let part_path = part_path_for(dest_dir, &resolved.name);

        let file = File::create(&part_path)
            .await
            .map_err(|e| DownloadError::io(&part_path, e))?;

        let streamed = self.stream_to_file(file, response, url, &part_path).await;
        let bytes = match streamed {
            Ok(bytes) => bytes,
            Err(error) => {
                debug!(path = %part_path.display(), "cleaning up partial file after error");
                let _ = tokio::fs::remove_file(&part_path).await;
                return Err(error);
            }
        };

        if let Err(e) = tokio::fs::rename(&part_path, &final_path).await {
            let _ = tokio::fs::remove_file(&part_path).await;
            return Err(DownloadError::io(&final_path, e));
        }

        Ok(SavedFile {
            path: final_path,
            bytes,
        })
    }

    async fn send_request(&self, parsed: Url, url: &str) -> Result<reqwest::Response, DownloadError> {
        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| transport_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::http_status(url, status.as_u16()));
        }
        Ok(response)
    }

    /// Streams the body through a buffered writer, aborting once the running
    /// total passes the ceiling.
    async fn stream_to_file(
        &self,
        file: File,
        response: reqwest::Response,
        url: &str,
        part_path: &Path,
    ) -> Result<u64, DownloadError> {
        let mut writer = BufWriter::with_capacity(self.limits.chunk_size, file);
        let mut stream = response.bytes_stream();
        let mut bytes_written: u64 = 0;

        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result.map_err(|e| transport_error(url, e))?;

            bytes_written = bytes_written.saturating_add(chunk.len() as u64);
            if bytes_written > self.limits.max_file_size {
                return Err(DownloadError::too_large(
                    url,
                    bytes_written,
                    self.limits.max_file_size,
                ));
            }

            writer
                .write_all(&chunk)
                .await
                .map_err(|e| DownloadError::io(part_path, e))?;
        }

        writer
            .flush()
            .await
            .map_err(|e| DownloadError::io(part_path, e))?;

        Ok(bytes_written)
    }
}

fn transport_error(url: &str, error: reqwest::Error) -> DownloadError {
    if error.is_timeout() {
        DownloadError::timeout(url)
    } else {
        DownloadError::network(url, error)
    }
}

/// Hidden, per-attempt unique sibling of the final file.
fn part_path_for(dest_dir: &Path, name: &str) -> PathBuf {
    let counter = PART_COUNTER.fetch_add(1, Ordering::Relaxed);
    dest_dir.join(format!(".{name}.{}-{counter}.part", std::process::id()))
}

fn default_user_agent() -> String {
    format!("bookdl/{}", env!("CARGO_PKG_VERSION"))
}

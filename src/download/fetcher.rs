//! Retrying fetcher: one link in, one outcome out.
//!
//! [`Fetch`] is the seam between the item processor and the network. The
//! production implementation, [`RetryingFetcher`], wraps [`HttpClient`] in a
//! [`RetryPolicy`] loop; tests substitute an in-memory implementation.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, instrument, warn};

use super::client::{HttpClient, SavedFile};
use super::error::DownloadError;
use super::retry::{RetryDecision, RetryPolicy, classify_error};

/// What to fetch and where to put it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Target URL.
    pub url: String,
    /// Directory the file is written into (created on demand).
    pub dest_dir: PathBuf,
    /// Link label, used for the fallback filename.
    pub label: String,
}

impl FetchRequest {
    /// Creates a request.
    pub fn new(url: impl Into<String>, dest_dir: impl Into<PathBuf>, label: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            dest_dir: dest_dir.into(),
            label: label.into(),
        }
    }
}

/// Result of fetching one link, after all retries.
#[derive(Debug)]
pub enum FetchOutcome {
    /// File written to `path`.
    Saved {
        /// Final file path.
        path: PathBuf,
        /// Bytes written.
        bytes: u64,
        /// Attempts used, including the successful one.
        attempts: u32,
        /// Backoff slept before each retry, in order.
        retry_delays: Vec<Duration>,
    },
    /// Skipped because the resource exceeds the ceiling. No bytes kept.
    TooLarge {
        /// Declared length, or bytes received when the streaming guard tripped.
        declared_bytes: u64,
        /// Configured ceiling.
        limit: u64,
    },
    /// Every attempt failed, or the failure was not retryable.
    Failed {
        /// Last error seen.
        error: DownloadError,
        /// Attempts used.
        attempts: u32,
        /// Backoff slept before each retry, in order.
        retry_delays: Vec<Duration>,
    },
}

impl FetchOutcome {
    /// True only for [`FetchOutcome::Saved`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Saved { .. })
    }

    /// Saved file path, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Saved { path, .. } => Some(path),
            Self::TooLarge { .. } | Self::Failed { .. } => None,
        }
    }
}

/// Retrieves a single link to disk.
///
/// Implementations never panic on network or disk failure; every failure is
/// folded into the returned [`FetchOutcome`].
#[async_trait]
pub trait Fetch: Send + Sync {
    /// Fetches `request.url` into `request.dest_dir`.
    async fn fetch(&self, request: &FetchRequest) -> FetchOutcome;
}

/// [`Fetch`] implementation over HTTP with exponential backoff.
///
/// Suspends only on network I/O, disk writes and the backoff sleep. When a
/// connection limit is configured, a permit is held for the duration of each
/// attempt and released while sleeping.
#[derive(Debug, Clone)]
pub struct RetryingFetcher {
    client: HttpClient,
    policy: RetryPolicy,
    connections: Option<Arc<Semaphore>>,
}

impl RetryingFetcher {
    /// Creates a fetcher without a connection cap.
    #[must_use]
    pub fn new(client: HttpClient, policy: RetryPolicy) -> Self {
        Self {
            client,
            policy,
            connections: None,
        }
    }

    /// Caps the number of simultaneous attempts across all callers.
    #[must_use]
    pub fn with_connection_limit(mut self, max_connections: usize) -> Self {
        self.connections = Some(Arc::new(Semaphore::new(max_connections.max(1))));
        self
    }

    /// Returns the retry policy in effect.
    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    async fn attempt(&self, request: &FetchRequest) -> Result<SavedFile, DownloadError> {
        let _permit = match &self.connections {
            Some(semaphore) => semaphore.acquire().await.ok(),
            None => None,
        };
        self.client
            .download_once(&request.url, &request.dest_dir, &request.label)
            .await
    }
}

#[async_trait]
impl Fetch for RetryingFetcher {
    #[instrument(skip(self, request), fields(url = %request.url, label = %request.label))]
    async fn fetch(&self, request: &FetchRequest) -> FetchOutcome {
        let mut attempt = 0u32;
        let mut retry_delays = Vec::new();

        loop {
            attempt += 1;
            debug!(attempt, "attempting download");

            let error = match self.attempt(request).await {
                Ok(saved) => {
                    info!(
                        path = %saved.path.display(),
                        bytes = saved.bytes,
                        attempt,
                        "download complete"
                    );
                    return FetchOutcome::Saved {
                        path: saved.path,
                        bytes: saved.bytes,
                        attempts: attempt,
                        retry_delays,
                    };
                }
                Err(e) => e,
            };

            if let DownloadError::TooLarge { bytes, limit, .. } = &error {
                warn!(declared_bytes = *bytes, limit = *limit, "oversize, skipping");
                return FetchOutcome::TooLarge {
                    declared_bytes: *bytes,
                    limit: *limit,
                };
            }

            match self.policy.should_retry(classify_error(&error), attempt) {
                RetryDecision::Retry {
                    delay,
                    attempt: next_attempt,
                } => {
                    warn!(
                        attempt = next_attempt,
                        max_attempts = self.policy.max_attempts(),
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %error,
                        "retrying download"
                    );
                    tokio::time::sleep(delay).await;
                    retry_delays.push(delay);
                }
                RetryDecision::DoNotRetry { reason } => {
                    error!(attempts = attempt, %reason, error = %error, "retries exhausted");
                    return FetchOutcome::Failed {
                        error,
                        attempts: attempt,
                        retry_delays,
                    };
                }
            }
        }
    }
}

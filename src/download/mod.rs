//! Link retrieval: HTTP transfer, filename resolution and retry.
//!
//! # Features
//!
//! - Streaming downloads with a bounded write buffer
//! - Size ceiling checked against `Content-Length` and the streamed total
//! - Filenames from `Content-Disposition` (RFC 5987 aware) or the URL path
//! - Exponential backoff with an optional connection cap
//! - Partial files never left behind
//!
//! # Example
//!
//! ```no_run
//! use bookdl_core::download::{Fetch, FetchRequest, HttpClient, RetryPolicy, RetryingFetcher};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let fetcher = RetryingFetcher::new(HttpClient::new()?, RetryPolicy::default());
//! let outcome = fetcher
//!     .fetch(&FetchRequest::new("https://example.com/book.pdf", "./downloads/Book", "PDF"))
//!     .await;
//! println!("saved: {:?}", outcome.path());
//! # Ok(())
//! # }
//! ```

mod client;
pub mod constants;
mod error;
mod fetcher;
pub mod filename;
mod retry;

pub use client::{HttpClient, SavedFile, TransferLimits};
pub use error::DownloadError;
pub use fetcher::{Fetch, FetchOutcome, FetchRequest, RetryingFetcher};
pub use filename::{FilenameSource, ResolvedFilename, resolve_filename};
pub use retry::{
    DEFAULT_BACKOFF_FACTOR, DEFAULT_INITIAL_BACKOFF, DEFAULT_MAX_ATTEMPTS, FailureType,
    RetryDecision, RetryPolicy, classify_error,
};

// Note: no module-local Result alias. Use `Result<T, DownloadError>` explicitly.

//! Book Catalog Downloader Core Library
//!
//! Turns a scraped book catalog (title to labelled download links) into files
//! on disk, resumably: each unfinished item has its links classified, the
//! preferred document (or every volume) fetched with retries, and its record
//! annotated, with the catalog checkpointed after every wave of items.
//!
//! # Architecture
//!
//! - [`classify`] - link categories, volume detection, format priority
//! - [`download`] - streaming HTTP client, filename resolution, retrying fetcher
//! - [`catalog`] - catalog model and durable checkpoint store
//! - [`processor`] - per-item selection, retrieval and annotation
//! - [`scheduler`] - wave-based batch driver with end-of-run summary
//! - [`config`] - run tunables, config file parsing
//! - [`logging`] - file and console tracing layers

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod catalog;
pub mod classify;
pub mod config;
pub mod download;
pub mod logging;
pub mod processor;
pub mod scheduler;

#[cfg(test)]
pub mod test_support;

// Re-export commonly used types
pub use catalog::{Catalog, CatalogError, CatalogItem, CatalogStore};
pub use classify::{Link, LinkCategory, LinkRules};
pub use config::{ConfigError, RunConfig};
pub use download::{
    DownloadError, Fetch, FetchOutcome, FetchRequest, HttpClient, RetryPolicy, RetryingFetcher,
};
pub use processor::{DownloadLayout, ItemPlan, ItemProcessor, ItemStatus, plan_item};
pub use scheduler::{BatchScheduler, RunSummary, SchedulerError};

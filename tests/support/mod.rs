//! Shared helpers for integration tests.

#![allow(dead_code)]

pub mod socket_guard;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use bookdl_core::download::{DownloadError, Fetch, FetchOutcome, FetchRequest};

/// Scripted response for one URL.
#[derive(Debug, Clone, Copy)]
pub enum Scripted {
    /// Write a small file named after the label.
    Save,
    /// Report an oversize resource.
    TooLarge,
    /// Report a failed fetch after `attempts` tries.
    Fail { attempts: u32 },
}

/// In-memory [`Fetch`] that records every request and never touches the
/// network. Unscripted URLs are saved.
#[derive(Debug, Default)]
pub struct RecordingFetcher {
    script: HashMap<String, Scripted>,
    requests: Mutex<Vec<FetchRequest>>,
}

impl RecordingFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(mut self, url: &str, response: Scripted) -> Self {
        self.script.insert(url.to_string(), response);
        self
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requested_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.requests().into_iter().map(|r| r.url).collect();
        urls.sort();
        urls
    }
}

#[async_trait]
impl Fetch for RecordingFetcher {
    async fn fetch(&self, request: &FetchRequest) -> FetchOutcome {
        self.requests.lock().unwrap().push(request.clone());
        match self.script.get(&request.url).copied().unwrap_or(Scripted::Save) {
            Scripted::Save => {
                let path: PathBuf = request.dest_dir.join(format!("{}.bin", request.label));
                tokio::fs::create_dir_all(&request.dest_dir).await.unwrap();
                tokio::fs::write(&path, b"data").await.unwrap();
                FetchOutcome::Saved {
                    path,
                    bytes: 4,
                    attempts: 1,
                    retry_delays: Vec::new(),
                }
            }
            Scripted::TooLarge => FetchOutcome::TooLarge {
                declared_bytes: 100,
                limit: 10,
            },
            Scripted::Fail { attempts } => FetchOutcome::Failed {
                error: DownloadError::http_status(&request.url, 503),
                attempts,
                retry_delays: Vec::new(),
            },
        }
    }
}

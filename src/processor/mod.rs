//! Item processor: runs one catalog item through selection and retrieval.
//!
//! The processor owns no catalog state. It is handed `&mut CatalogItem` for
//! exactly one key, fetches what [`plan_item`] selected, writes mobile-app
//! descriptors, and annotates the record with the result.
//!
//! Files land in a [`DownloadLayout`]:
//!
//! ```text
//! <root>/<folder>/...                  documents
//! <root>/audio_books/<folder>/...      download-enabled audio
//! <root>/mobile_apps/<folder>_<label>.txt
//! ```

mod plan;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::future::join_all;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::catalog::CatalogItem;
use crate::classify::{Link, LinkRules};
use crate::download::constants::{MAX_FILENAME_BYTES, MAX_FILENAME_CHARS};
use crate::download::filename::{bound_filename, sanitize_component, truncate_with_ellipsis};
use crate::download::{Fetch, FetchOutcome, FetchRequest};

pub use plan::{AudioOnlyReason, FetchPlan, ItemPlan, plan_item};

/// Default download root.
pub const DEFAULT_DOWNLOAD_ROOT: &str = "downloads";

/// Audio subtree under the download root.
pub const AUDIO_DIR_NAME: &str = "audio_books";

/// Mobile-app descriptor directory under the download root.
pub const MOBILE_DIR_NAME: &str = "mobile_apps";

/// Folder used when a title sanitizes to nothing.
const UNTITLED_FOLDER: &str = "untitled";

/// Where documents, audio and descriptors are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadLayout {
    root: PathBuf,
}

impl Default for DownloadLayout {
    fn default() -> Self {
        Self::new(DEFAULT_DOWNLOAD_ROOT)
    }
}

impl DownloadLayout {
    /// Creates a layout rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Document root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Audio root.
    #[must_use]
    pub fn audio_root(&self) -> PathBuf {
        self.root.join(AUDIO_DIR_NAME)
    }

    /// Mobile-app descriptor directory.
    #[must_use]
    pub fn mobile_root(&self) -> PathBuf {
        self.root.join(MOBILE_DIR_NAME)
    }

    /// Document folder for an item.
    #[must_use]
    pub fn item_dir(&self, folder: &str) -> PathBuf {
        self.root.join(folder)
    }

    /// Audio folder for an item.
    #[must_use]
    pub fn audio_dir(&self, folder: &str) -> PathBuf {
        self.audio_root().join(folder)
    }

    /// Descriptor file for one mobile-app link of an item.
    #[must_use]
    pub fn descriptor_path(&self, folder: &str, label: &str) -> PathBuf {
        let name = format!("{folder}_{}", sanitize_component(label));
        let name = truncate_with_ellipsis(
            &name,
            MAX_FILENAME_CHARS - ".txt".len(),
            MAX_FILENAME_BYTES - ".txt".len(),
        );
        self.mobile_root().join(format!("{name}.txt"))
    }

    /// Creates the three top-level directories (idempotent).
    ///
    /// # Errors
    ///
    /// Returns the first directory creation failure.
    pub async fn ensure_dirs(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::create_dir_all(self.audio_root()).await?;
        tokio::fs::create_dir_all(self.mobile_root()).await
    }
}

/// Folder name for an item title: reserved characters stripped, bounded,
/// never empty.
#[must_use]
pub fn folder_name(title: &str) -> String {
    let cleaned = sanitize_component(title);
    let cleaned = cleaned.trim_matches('.');
    if cleaned.is_empty() {
        return UNTITLED_FOLDER.to_string();
    }
    bound_filename(cleaned)
}

/// Descriptor file body for a mobile-app link.
#[must_use]
pub fn descriptor_contents(title: &str, link: &Link) -> String {
    format!(
        "Title: {title}\nLink Type: {}\nURL: {}\n",
        link.label, link.url
    )
}

/// Why an item ended without any saved file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ItemFailure {
    /// Selection left nothing to fetch; no network access happened.
    #[error("no valid download links")]
    NoValidLinks,

    /// Every fetch failed or was skipped.
    #[error("all {attempted} downloads failed")]
    AllFetchesFailed {
        /// Number of fetches dispatched.
        attempted: usize,
    },
}

/// Result of processing one item in this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemStatus {
    /// Already `scraped` before the run.
    Skipped,
    /// No document links; marked `audio_book`.
    AudioOnly,
    /// At least one file saved; marked `scraped`.
    Downloaded {
        /// Saved files.
        files: Vec<PathBuf>,
    },
    /// Nothing saved.
    Failed {
        /// Why.
        reason: ItemFailure,
    },
}

/// Runs single items through selection, retrieval and annotation.
#[derive(Clone)]
pub struct ItemProcessor {
    fetcher: Arc<dyn Fetch>,
    layout: DownloadLayout,
    rules: LinkRules,
}

impl std::fmt::Debug for ItemProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemProcessor")
            .field("layout", &self.layout)
            .field("rules", &self.rules)
            .finish_non_exhaustive()
    }
}

impl ItemProcessor {
    /// Creates a processor with the built-in link rules.
    pub fn new(fetcher: Arc<dyn Fetch>, layout: DownloadLayout) -> Self {
        Self {
            fetcher,
            layout,
            rules: LinkRules::default(),
        }
    }

    /// Replaces the link rules.
    #[must_use]
    pub fn with_rules(mut self, rules: LinkRules) -> Self {
        self.rules = rules;
        self
    }

    /// The layout files are written into.
    #[must_use]
    pub fn layout(&self) -> &DownloadLayout {
        &self.layout
    }

    /// The link rules in effect.
    #[must_use]
    pub fn rules(&self) -> &LinkRules {
        &self.rules
    }

    /// Processes the item stored under `key`, updating its record in place.
    ///
    /// All fetches for the item run concurrently, alongside the descriptor
    /// writes, and are awaited together. A failing link never affects its
    /// siblings.
    #[instrument(skip_all, fields(item = %key))]
    pub async fn process(&self, key: &str, item: &mut CatalogItem) -> ItemStatus {
        let plan = match plan_item(item, &self.rules) {
            ItemPlan::AlreadyDone => {
                info!("skip, already scraped");
                return ItemStatus::Skipped;
            }
            ItemPlan::AudioOnly(reason) => {
                item.audio_book = Some(true);
                info!(?reason, "audio_only");
                return ItemStatus::AudioOnly;
            }
            ItemPlan::NoValidLinks { excluded_previews } => {
                warn!(excluded_previews, "no valid links");
                return ItemStatus::Failed {
                    reason: ItemFailure::NoValidLinks,
                };
            }
            ItemPlan::Fetch(plan) => plan,
        };

        let folder = folder_name(key);
        let item_dir = self.layout.item_dir(&folder);
        let audio_dir = self.layout.audio_dir(&folder);
        let requests: Vec<FetchRequest> = plan
            .documents
            .iter()
            .map(|link| FetchRequest::new(&link.url, &item_dir, &link.label))
            .chain(
                plan.audio
                    .iter()
                    .map(|link| FetchRequest::new(&link.url, &audio_dir, &link.label)),
            )
            .collect();

        let fetches = join_all(requests.iter().map(|request| self.fetcher.fetch(request)));
        let descriptors = self.write_descriptors(key, &folder, &plan.mobile);
        let (outcomes, ()) = tokio::join!(fetches, descriptors);

        let attempted = outcomes.len();
        let files: Vec<PathBuf> = outcomes
            .into_iter()
            .filter_map(|outcome| match outcome {
                FetchOutcome::Saved { path, .. } => Some(path),
                FetchOutcome::TooLarge { .. } | FetchOutcome::Failed { .. } => None,
            })
            .collect();

        if files.is_empty() {
            warn!(attempted, "no file downloaded");
            return ItemStatus::Failed {
                reason: ItemFailure::AllFetchesFailed { attempted },
            };
        }

        item.scraped = true;
        if plan.has_audio {
            item.has_audio = Some(true);
        }
        if plan.has_mobile_apps() {
            item.has_mobile_apps = Some(true);
        }
        info!(files = files.len(), attempted, "item downloaded");
        ItemStatus::Downloaded { files }
    }

    /// Writes one descriptor per mobile-app link. Failures are logged only.
    async fn write_descriptors(&self, title: &str, folder: &str, links: &[Link]) {
        if links.is_empty() {
            return;
        }
        let mobile_root = self.layout.mobile_root();
        if let Err(error) = tokio::fs::create_dir_all(&mobile_root).await {
            warn!(path = %mobile_root.display(), %error, "cannot create mobile_apps directory");
            return;
        }
        for link in links {
            let path = self.layout.descriptor_path(folder, &link.label);
            if let Err(error) = tokio::fs::write(&path, descriptor_contents(title, link)).await {
                warn!(path = %path.display(), %error, "descriptor write failed");
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_paths() {
        let layout = DownloadLayout::new("/data");
        assert_eq!(layout.item_dir("Book"), PathBuf::from("/data/Book"));
        assert_eq!(layout.audio_dir("Book"), PathBuf::from("/data/audio_books/Book"));
        assert_eq!(
            layout.descriptor_path("Book", "Google Play"),
            PathBuf::from("/data/mobile_apps/Book_Google Play.txt")
        );
        assert_eq!(DownloadLayout::default().root(), Path::new("downloads"));
    }

    #[test]
    fn test_descriptor_path_is_bounded() {
        let layout = DownloadLayout::new("/data");
        let folder = "β".repeat(100);
        let path = layout.descriptor_path(&folder, "iOS/iPad");
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.chars().count() <= MAX_FILENAME_CHARS);
        assert!(name.len() <= MAX_FILENAME_BYTES);
        assert!(name.ends_with(".txt"));
        assert!(!name.contains('/'));
    }

    #[test]
    fn test_folder_name() {
        assert_eq!(folder_name("Η Ιλιάδα: Ραψωδία Α"), "Η Ιλιάδα Ραψωδία Α");
        assert_eq!(folder_name("a/b?c"), "abc");
        assert_eq!(folder_name("???"), "untitled");
        assert_eq!(folder_name(".."), "untitled");
        assert_eq!(folder_name(&"x".repeat(300)).chars().count(), MAX_FILENAME_CHARS);
        let cjk = folder_name(&"書".repeat(100));
        assert!(cjk.len() <= MAX_FILENAME_BYTES);
        assert!(cjk.ends_with("..."));
    }

    #[test]
    fn test_descriptor_contents() {
        let link = Link::new("Android", "https://play.google.com/store/apps/x");
        assert_eq!(
            descriptor_contents("Βιβλίο", &link),
            "Title: Βιβλίο\nLink Type: Android\nURL: https://play.google.com/store/apps/x\n"
        );
    }

    #[tokio::test]
    async fn test_ensure_dirs_idempotent() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let layout = DownloadLayout::new(temp_dir.path().join("downloads"));
        layout.ensure_dirs().await.unwrap();
        layout.ensure_dirs().await.unwrap();
        assert!(layout.audio_root().is_dir());
        assert!(layout.mobile_root().is_dir());
    }

    #[test]
    fn test_item_failure_display() {
        assert_eq!(
            ItemFailure::AllFetchesFailed { attempted: 2 }.to_string(),
            "all 2 downloads failed"
        );
    }
}

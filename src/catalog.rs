//! Book catalog: the data model and its JSON persistence.
//!
//! The catalog is a JSON object keyed by book title. Each record holds the
//! scraped `links` (label to URL) plus progress flags written back by the
//! pipeline. Everything else in a record (`metadata`, fields added by newer
//! scrapers) is carried through untouched.
//!
//! ```json
//! {
//!   "Η Ιλιάδα": {
//!     "links": { "PDF": "https://example.com/iliada.pdf" },
//!     "scraped": true,
//!     "metadata": { "author": "Όμηρος" }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::collections::btree_map;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::classify::Link;

/// Default catalog file name.
pub const DEFAULT_CATALOG_FILE: &str = "books.json";

/// Errors reading or writing the catalog file.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The file could not be read.
    #[error("failed to read catalog {path}: {source}")]
    Read {
        /// Catalog path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },

    /// The file is not a valid catalog.
    #[error("failed to parse catalog {path}: {source}")]
    Parse {
        /// Catalog path.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The checkpoint could not be written.
    #[error("failed to write catalog {path}: {source}")]
    Write {
        /// Path being written (temp file or final).
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

impl CatalogError {
    fn read(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }

    fn parse(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Parse {
            path: path.into(),
            source,
        }
    }

    fn write(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }
}

/// One book record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    /// Link label to URL. Null URLs are dropped on load.
    #[serde(default, deserialize_with = "deserialize_links")]
    pub links: BTreeMap<String, String>,

    /// Set once at least one document or audio file was saved.
    #[serde(default)]
    pub scraped: bool,

    /// Every link was audio, or there were no links at all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_book: Option<bool>,

    /// The item had at least one audio link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_audio: Option<bool>,

    /// The item had at least one mobile-app link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_mobile_apps: Option<bool>,

    /// Scraper metadata (author, ISBN, ...). Never interpreted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,

    /// Any other fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CatalogItem {
    /// Creates an unprocessed item from label/URL pairs.
    pub fn with_links<I, L, U>(links: I) -> Self
    where
        I: IntoIterator<Item = (L, U)>,
        L: Into<String>,
        U: Into<String>,
    {
        Self {
            links: links
                .into_iter()
                .map(|(label, url)| (label.into(), url.into()))
                .collect(),
            ..Self::default()
        }
    }

    /// Links as [`Link`] values, in label order.
    #[must_use]
    pub fn link_list(&self) -> Vec<Link> {
        self.links
            .iter()
            .map(|(label, url)| Link::new(label.as_str(), url.as_str()))
            .collect()
    }
}

fn deserialize_links<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, Option<String>>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(label, url)| {
            if url.is_none() {
                warn!(label = %label, "dropping link without URL");
            }
            url.map(|url| (label, url))
        })
        .collect())
}

/// All items keyed by title.
///
/// Keys are ordered, so iteration (and therefore wave membership) is
/// deterministic. There is no removal API: items are only annotated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Catalog {
    items: BTreeMap<String, CatalogItem>,
}

impl Catalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True if there are no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Looks up an item.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&CatalogItem> {
        self.items.get(key)
    }

    /// Looks up an item for mutation.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut CatalogItem> {
        self.items.get_mut(key)
    }

    /// Iterates items in key order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, CatalogItem> {
        self.items.iter()
    }

    /// Iterates items in key order with exclusive access to each record.
    pub fn iter_mut(&mut self) -> btree_map::IterMut<'_, String, CatalogItem> {
        self.items.iter_mut()
    }

    /// Inserts or wholly replaces an item.
    pub fn insert(&mut self, key: impl Into<String>, item: CatalogItem) -> Option<CatalogItem> {
        self.items.insert(key.into(), item)
    }

    /// Number of items already marked `scraped`.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.items.values().filter(|item| item.scraped).count()
    }
}

impl<'a> IntoIterator for &'a Catalog {
    type Item = (&'a String, &'a CatalogItem);
    type IntoIter = btree_map::Iter<'a, String, CatalogItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<K: Into<String>> FromIterator<(K, CatalogItem)> for Catalog {
    fn from_iter<T: IntoIterator<Item = (K, CatalogItem)>>(iter: T) -> Self {
        Self {
            items: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Durable home of the catalog: load once, checkpoint repeatedly.
#[derive(Debug, Clone)]
pub struct CatalogStore {
    path: PathBuf,
}

impl CatalogStore {
    /// Creates a store for `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The catalog file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads and parses the catalog.
    ///
    /// # Errors
    ///
    /// [`CatalogError::Read`] if the file is missing or unreadable,
    /// [`CatalogError::Parse`] if it is not a JSON object of records.
    pub async fn load(&self) -> Result<Catalog, CatalogError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| CatalogError::read(&self.path, e))?;
        let catalog: Catalog =
            serde_json::from_str(&content).map_err(|e| CatalogError::parse(&self.path, e))?;
        info!(path = %self.path.display(), items = catalog.len(), "catalog loaded");
        Ok(catalog)
    }

    /// Writes the whole catalog, replacing the previous file atomically.
    ///
    /// The JSON goes to a hidden temp file next to the target and is renamed
    /// over it, so readers see either the old or the new catalog.
    ///
    /// # Errors
    ///
    /// [`CatalogError::Write`] if serializing, writing or renaming fails.
    pub async fn checkpoint(&self, catalog: &Catalog) -> Result<(), CatalogError> {
        let json = serde_json::to_string_pretty(catalog)
            .map_err(|e| CatalogError::write(&self.path, io::Error::other(e)))?;

        let tmp_path = self.temp_path();
        if let Err(e) = tokio::fs::write(&tmp_path, json.as_bytes()).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(CatalogError::write(&tmp_path, e));
        }
        if let Err(e) = tokio::fs::rename(&tmp_path, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(CatalogError::write(&self.path, e));
        }

        debug!(path = %self.path.display(), items = catalog.len(), "checkpoint written");
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map_or_else(|| "catalog".into(), |n| n.to_string_lossy().into_owned());
        self.path.with_file_name(format!(".{name}.tmp"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"{
        "Βιβλίο Α": {
            "links": { "PDF": "https://example.com/a.pdf", "Broken": null },
            "scraped": false,
            "metadata": { "author": "Συγγραφέας", "pages": 120 },
            "source_page": "https://example.com/book/a"
        },
        "Βιβλίο Β": {
            "links": {},
            "scraped": true,
            "audio_book": true
        }
    }"#;

    #[test]
    fn test_parse_sample_catalog() {
        let catalog: Catalog = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(catalog.len(), 2);

        let a = catalog.get("Βιβλίο Α").unwrap();
        assert_eq!(a.links.len(), 1, "null link dropped");
        assert!(!a.scraped);
        assert_eq!(a.metadata.as_ref().unwrap()["pages"], 120);
        assert_eq!(a.extra["source_page"], "https://example.com/book/a");

        let b = catalog.get("Βιβλίο Β").unwrap();
        assert!(b.scraped);
        assert_eq!(b.audio_book, Some(true));
        assert_eq!(b.has_audio, None);
    }

    #[test]
    fn test_missing_fields_default() {
        let item: CatalogItem = serde_json::from_str("{}").unwrap();
        assert!(item.links.is_empty());
        assert!(!item.scraped);
        assert!(item.metadata.is_none());
    }

    #[test]
    fn test_absent_flags_not_serialized() {
        let item = CatalogItem::with_links([("PDF", "https://x/a.pdf")]);
        let json = serde_json::to_value(&item).unwrap();
        let object = json.as_object().unwrap();
        assert!(object.contains_key("links"));
        assert!(object.contains_key("scraped"));
        assert!(!object.contains_key("audio_book"));
        assert!(!object.contains_key("has_audio"));
        assert!(!object.contains_key("metadata"));
    }

    #[tokio::test]
    async fn test_checkpoint_round_trip_preserves_unknown_fields() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("books.json");
        std::fs::write(&path, SAMPLE).unwrap();

        let store = CatalogStore::new(&path);
        let mut catalog = store.load().await.unwrap();
        catalog.get_mut("Βιβλίο Α").unwrap().has_mobile_apps = Some(true);
        store.checkpoint(&catalog).await.unwrap();

        let reloaded = store.load().await.unwrap();
        assert_eq!(reloaded, catalog);
        let a = reloaded.get("Βιβλίο Α").unwrap();
        assert_eq!(a.metadata.as_ref().unwrap()["author"], "Συγγραφέας");
        assert_eq!(a.extra["source_page"], "https://example.com/book/a");
        assert_eq!(a.has_mobile_apps, Some(true));

        let entries: Vec<_> = std::fs::read_dir(temp_dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1, "temp file must not remain");
    }

    #[tokio::test]
    async fn test_load_missing_file_is_read_error() {
        let temp_dir = TempDir::new().unwrap();
        let store = CatalogStore::new(temp_dir.path().join("absent.json"));
        assert!(matches!(store.load().await, Err(CatalogError::Read { .. })));
    }

    #[tokio::test]
    async fn test_load_invalid_json_is_parse_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("books.json");
        std::fs::write(&path, "[1, 2, 3]").unwrap();
        let store = CatalogStore::new(&path);
        assert!(matches!(store.load().await, Err(CatalogError::Parse { .. })));
    }

    #[tokio::test]
    async fn test_checkpoint_into_missing_directory_fails() {
        let temp_dir = TempDir::new().unwrap();
        let store = CatalogStore::new(temp_dir.path().join("nope").join("books.json"));
        let result = store.checkpoint(&Catalog::new()).await;
        assert!(matches!(result, Err(CatalogError::Write { .. })));
    }

    #[test]
    fn test_completed_count() {
        let mut done = CatalogItem::default();
        done.scraped = true;
        let catalog: Catalog = [("a", done), ("b", CatalogItem::default())]
            .into_iter()
            .collect();
        assert_eq!(catalog.completed(), 1);
    }
}

//! Link classification for scraped download links.
//!
//! Every link scraped for a book carries a free-text label ("PDF",
//! "Ακούστε το βιβλίο", "Τόμος 2", "Google Play", ...). This module decides
//! what each label means, using an ordered keyword table ([`LinkRules`]):
//!
//! | Precedence | Category | Examples |
//! |------------|----------|----------|
//! | 1 | [`LinkCategory::Audio`] | `audio`, `mp3`, `ακούστε` |
//! | 2 | [`LinkCategory::MobileApp`] | `android`, `ios`, `google play` |
//! | 3 | [`LinkCategory::Document`] | `pdf`, `epub`, `kindle`, `διαβάστε` |
//! | 4 | [`LinkCategory::VolumePart`] | `τόμος`, `τεύχος`, `v.1`, `#2` |
//!
//! Matching is a case-insensitive substring test. A label that matches
//! nothing is [`LinkCategory::Unclassified`] and is only treated as a document
//! when an item has no better candidates.
//!
//! # Example
//!
//! ```
//! use bookdl_core::classify::{LinkCategory, LinkRules};
//!
//! let rules = LinkRules::default();
//! assert_eq!(rules.classify("Audio Book"), LinkCategory::Audio);
//! assert_eq!(rules.classify("Τόμος 1"), LinkCategory::VolumePart);
//! assert!(rules.should_fetch_all_volumes(["Τόμος 1", "Τόμος 2"]));
//! ```

use std::fmt;
use std::sync::LazyLock;

/// URL suffix marking a share link that only previews the file.
pub const PREVIEW_ONLY_MARKER: &str = "dl=0";

/// URL fragment marking a share link that serves the raw file.
pub const DOWNLOAD_ENABLED_MARKER: &str = "dl=1";

const AUDIO_KEYWORDS: &[&str] = &["audio", "audio-book", "audio book", "ακούστε", "podcast", "mp3"];

const MOBILE_APP_KEYWORDS: &[&str] = &["android", "apple", "ios", "google play"];

const DOCUMENT_KEYWORDS: &[&str] = &["pdf", "epub", "kindle", "mobi", ".mobi", "διαβάστε", "κατεβάστε"];

const VOLUME_INDICATORS: &[&str] = &[
    "τόμος", "τεύχος", "μέρος", "τόμ", "τευχ", "μερ",
    "α'", "β'", "γ'", "δ'", "ε'", "στ'", "ζ'", "η'",
    "1ος", "2ος", "3ος", "4ος", "5ος", "6ος", "7ος", "8ος", "9ος", "10ος",
    "1ο", "2ο", "3ο", "4ο", "5ο", "6ο", "7ο", "8ο", "9ο", "10ο",
    "v.1", "v.2", "v.3", "v.4", "v.5",
    "τόμος α", "τόμος β", "τόμος γ",
    "#1", "#2", "#3", "#4", "#5",
    "τεύχος 1", "τεύχος 2", "τεύχος 3",
];

/// Preferred formats for single-link selection, best first.
const FORMAT_PRIORITY: &[&str] = &["PDF", "ePub", "Kindle mobi", "Kindle", "Διαβάστε"];

static DEFAULT_RULES: LazyLock<LinkRules> = LazyLock::new(LinkRules::default);

/// What a link label says about the linked resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkCategory {
    /// Audio book or podcast episode.
    Audio,
    /// Store page for a mobile reading app.
    MobileApp,
    /// Downloadable document (PDF, EPUB, Kindle, read-online).
    Document,
    /// One volume/part of a multi-part work, without an explicit format.
    VolumePart,
    /// No keyword matched.
    Unclassified,
}

impl LinkCategory {
    /// Returns the stable string representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::MobileApp => "mobile_app",
            Self::Document => "document",
            Self::VolumePart => "volume_part",
            Self::Unclassified => "unclassified",
        }
    }
}

impl fmt::Display for LinkCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A labelled download link taken from a catalog item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// Free-text label from the scrape.
    pub label: String,
    /// Target URL.
    pub url: String,
}

impl Link {
    /// Creates a link from a label/URL pair.
    pub fn new(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            url: url.into(),
        }
    }
}

/// One row of the keyword table: every keyword maps to the same category.
#[derive(Debug, Clone)]
struct KeywordRule {
    category: LinkCategory,
    /// Lowercased keywords.
    keywords: Vec<String>,
}

impl KeywordRule {
    fn new(category: LinkCategory, keywords: &[&str]) -> Self {
        Self {
            category,
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
        }
    }

    fn matches(&self, lowered_label: &str) -> bool {
        self.keywords
            .iter()
            .any(|keyword| lowered_label.contains(keyword.as_str()))
    }
}

/// Ordered keyword table plus the selection policy built on top of it.
///
/// Rules are evaluated in precedence order; the first rule with a matching
/// keyword decides the category. Volume detection is independent of
/// precedence: "Τόμος 1 PDF" is a [`LinkCategory::Document`] that also
/// reports [`is_volume_or_part`](Self::is_volume_or_part).
#[derive(Debug, Clone)]
pub struct LinkRules {
    rules: Vec<KeywordRule>,
    /// Lowercased format names, best first.
    format_priority: Vec<String>,
    preview_marker: String,
    download_marker: String,
}

impl Default for LinkRules {
    fn default() -> Self {
        Self {
            rules: vec![
                KeywordRule::new(LinkCategory::Audio, AUDIO_KEYWORDS),
                KeywordRule::new(LinkCategory::MobileApp, MOBILE_APP_KEYWORDS),
                KeywordRule::new(LinkCategory::Document, DOCUMENT_KEYWORDS),
                KeywordRule::new(LinkCategory::VolumePart, VOLUME_INDICATORS),
            ],
            format_priority: FORMAT_PRIORITY.iter().map(|f| f.to_lowercase()).collect(),
            preview_marker: PREVIEW_ONLY_MARKER.to_string(),
            download_marker: DOWNLOAD_ENABLED_MARKER.to_string(),
        }
    }
}

impl LinkRules {
    /// Adds keywords to the rule of `category`.
    ///
    /// Categories keep their precedence; [`LinkCategory::Unclassified`] has no
    /// rule and is ignored.
    #[must_use]
    pub fn with_keywords(mut self, category: LinkCategory, keywords: &[&str]) -> Self {
        if let Some(rule) = self.rules.iter_mut().find(|r| r.category == category) {
            rule.keywords
                .extend(keywords.iter().map(|k| k.to_lowercase()));
        }
        self
    }

    /// Replaces the best-link format priority list (best first).
    #[must_use]
    pub fn with_format_priority(mut self, formats: &[&str]) -> Self {
        self.format_priority = formats.iter().map(|f| f.to_lowercase()).collect();
        self
    }

    /// Classifies a link label.
    #[must_use]
    pub fn classify(&self, label: &str) -> LinkCategory {
        let lowered = label.to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.matches(&lowered))
            .map_or(LinkCategory::Unclassified, |rule| rule.category)
    }

    /// Returns true if the label carries a volume/part/issue marker.
    #[must_use]
    pub fn is_volume_or_part(&self, label: &str) -> bool {
        let lowered = label.to_lowercase();
        self.rules
            .iter()
            .filter(|rule| rule.category == LinkCategory::VolumePart)
            .any(|rule| rule.matches(&lowered))
    }

    /// Returns true if any label carries a volume marker, which switches the
    /// item from "best single link" to "fetch every document link".
    pub fn should_fetch_all_volumes<'a, I>(&self, labels: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        labels.into_iter().any(|label| self.is_volume_or_part(label))
    }

    /// Picks the single preferred document link.
    ///
    /// The format priority list is walked best-first; for each format the
    /// first candidate whose label contains it wins. Without any format match
    /// the first candidate is returned.
    #[must_use]
    pub fn select_best_link<'a>(&self, candidates: &'a [Link]) -> Option<&'a Link> {
        self.format_priority
            .iter()
            .find_map(|format| {
                candidates
                    .iter()
                    .find(|link| link.label.to_lowercase().contains(format.as_str()))
            })
            .or_else(|| candidates.first())
    }

    /// Returns true if the URL only previews the file.
    #[must_use]
    pub fn is_preview_only(&self, url: &str) -> bool {
        url.ends_with(self.preview_marker.as_str())
    }

    /// Returns true if the URL serves the raw file (required for audio links).
    #[must_use]
    pub fn is_download_enabled(&self, url: &str) -> bool {
        url.contains(self.download_marker.as_str())
    }
}

/// Classifies a label with the built-in rule table.
#[must_use]
pub fn classify(label: &str) -> LinkCategory {
    DEFAULT_RULES.classify(label)
}

/// Volume policy with the built-in rule table.
pub fn should_fetch_all_volumes<'a, I>(labels: I) -> bool
where
    I: IntoIterator<Item = &'a str>,
{
    DEFAULT_RULES.should_fetch_all_volumes(labels)
}

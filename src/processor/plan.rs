//! Link selection for one catalog item, without any I/O.
//!
//! [`plan_item`] turns an item's links into an [`ItemPlan`]. The processor
//! executes the plan; the dry-run preview only prints it.

use crate::catalog::CatalogItem;
use crate::classify::{Link, LinkCategory, LinkRules};

/// Why an item counts as audio-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioOnlyReason {
    /// The item has no links at all.
    NoLinks,
    /// Every link is an audio link.
    AllAudio,
}

/// Everything an item needs fetched or written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPlan {
    /// Document links to fetch into the item folder.
    pub documents: Vec<Link>,
    /// Download-enabled audio links to fetch into the audio folder.
    pub audio: Vec<Link>,
    /// Mobile-app links to record as descriptor files.
    pub mobile: Vec<Link>,
    /// The audio bucket was non-empty, fetchable or not.
    pub has_audio: bool,
    /// Every document link was selected because of volume markers.
    pub all_volumes: bool,
}

impl FetchPlan {
    /// True if the item had any mobile-app link.
    #[must_use]
    pub fn has_mobile_apps(&self) -> bool {
        !self.mobile.is_empty()
    }

    /// Number of network retrievals this plan performs.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.documents.len() + self.audio.len()
    }
}

/// What to do with one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemPlan {
    /// `scraped` is already set.
    AlreadyDone,
    /// Nothing to fetch; the item is an audio book.
    AudioOnly(AudioOnlyReason),
    /// Document links existed but none survived selection.
    NoValidLinks {
        /// Selected links dropped for being preview-only.
        excluded_previews: usize,
    },
    /// Fetch and record as described.
    Fetch(FetchPlan),
}

/// Decides what to fetch for `item`.
///
/// 1. Items already `scraped` are done.
/// 2. No links, or only audio links: audio-only.
/// 3. Links are bucketed into audio, mobile and document (document or
///    volume-part labels). An empty document bucket is refilled with every
///    link that is neither audio nor mobile.
/// 4. With any volume marker among the documents, all of them are taken;
///    otherwise only the best one by format priority.
/// 5. Preview-only URLs are dropped. Nothing left means no valid links.
#[must_use]
pub fn plan_item(item: &CatalogItem, rules: &LinkRules) -> ItemPlan {
    if item.scraped {
        return ItemPlan::AlreadyDone;
    }
    if item.links.is_empty() {
        return ItemPlan::AudioOnly(AudioOnlyReason::NoLinks);
    }

    let classified: Vec<(Link, LinkCategory)> = item
        .link_list()
        .into_iter()
        .map(|link| {
            let category = rules.classify(&link.label);
            (link, category)
        })
        .collect();

    if classified
        .iter()
        .all(|(_, category)| *category == LinkCategory::Audio)
    {
        return ItemPlan::AudioOnly(AudioOnlyReason::AllAudio);
    }

    let mut audio = Vec::new();
    let mut mobile = Vec::new();
    let mut documents = Vec::new();
    let mut unclassified = Vec::new();
    for (link, category) in classified {
        match category {
            LinkCategory::Audio => audio.push(link),
            LinkCategory::MobileApp => mobile.push(link),
            LinkCategory::Document | LinkCategory::VolumePart => documents.push(link),
            LinkCategory::Unclassified => unclassified.push(link),
        }
    }
    if documents.is_empty() {
        documents = unclassified;
    }

    let all_volumes = rules.should_fetch_all_volumes(documents.iter().map(|l| l.label.as_str()));
    let selected: Vec<Link> = if all_volumes {
        documents
    } else {
        rules
            .select_best_link(&documents)
            .cloned()
            .into_iter()
            .collect()
    };

    let before = selected.len();
    let selected: Vec<Link> = selected
        .into_iter()
        .filter(|link| !rules.is_preview_only(&link.url))
        .collect();
    if selected.is_empty() {
        return ItemPlan::NoValidLinks {
            excluded_previews: before,
        };
    }

    let has_audio = !audio.is_empty();
    let audio = audio
        .into_iter()
        .filter(|link| rules.is_download_enabled(&link.url))
        .collect();

    ItemPlan::Fetch(FetchPlan {
        documents: selected,
        audio,
        mobile,
        has_audio,
        all_volumes,
    })
}

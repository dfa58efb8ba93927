//! Dry-run command flow for previewing link selection.

use bookdl_core::catalog::Catalog;
use bookdl_core::classify::LinkRules;
use bookdl_core::processor::{AudioOnlyReason, ItemPlan, plan_item};
use tracing::info;

/// Prints the selection plan of every item. No network access, no writes.
pub fn run_dry_run_preview(catalog: &Catalog) {
    let rules = LinkRules::default();
    let mut fetches = 0usize;
    let mut pending = 0usize;

    println!("Dry run preview: {} item(s).", catalog.len());
    for (key, item) in catalog {
        let plan = plan_item(item, &rules);
        if let ItemPlan::Fetch(fetch) = &plan {
            fetches += fetch.fetch_count();
            pending += 1;
        }
        println!("- {}", describe_plan(key, &plan));
    }

    info!(items = catalog.len(), pending, fetches, "dry run complete");
    println!("Dry run summary: {pending} item(s) to fetch, {fetches} download(s).");
    println!("Dry run - no files downloaded");
}

/// One preview line for an item.
fn describe_plan(key: &str, plan: &ItemPlan) -> String {
    match plan {
        ItemPlan::AlreadyDone => format!("[skip] {key}"),
        ItemPlan::AudioOnly(AudioOnlyReason::NoLinks) => format!("[audio-only] {key} (no links)"),
        ItemPlan::AudioOnly(AudioOnlyReason::AllAudio) => format!("[audio-only] {key}"),
        ItemPlan::NoValidLinks { excluded_previews } => {
            format!("[no valid links] {key} ({excluded_previews} preview-only)")
        }
        ItemPlan::Fetch(fetch) => {
            let mut line = format!(
                "[fetch] {key}: {} document, {} audio, {} descriptor",
                fetch.documents.len(),
                fetch.audio.len(),
                fetch.mobile.len()
            );
            if fetch.all_volumes {
                line.push_str(" (all volumes)");
            }
            for link in fetch.documents.iter().chain(&fetch.audio) {
                line.push_str(&format!("\n    {} -> {}", link.label, link.url));
            }
            line
        }
    }
}

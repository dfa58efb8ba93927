//! Progress bar for scheduler runs.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

const BAR_TEMPLATE: &str = "{bar:40.cyan/blue} {pos}/{len} items [{elapsed_precise}] eta {eta}";

/// Builds the item progress bar, or a hidden one when not requested.
///
/// The bar draws on stderr so the summary on stdout stays clean.
pub(crate) fn build_progress_bar(enabled: bool, total: usize) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::with_draw_target(Some(total as u64), ProgressDrawTarget::stderr());
    bar.set_style(
        ProgressStyle::with_template(BAR_TEMPLATE).unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar
}

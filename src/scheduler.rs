//! Batch scheduler: drives the whole catalog through the item processor.
//!
//! Items are processed in waves of `wave_size`, in key order. Every item of a
//! wave runs concurrently; the next wave starts only when the previous one
//! has fully completed, and the catalog is checkpointed in between. A crash
//! therefore loses at most the wave in flight.
//!
//! Each wave future holds a distinct `&mut CatalogItem` taken from a single
//! `iter_mut()` pass, so no two tasks can touch the same record and the
//! checkpoint (which needs `&Catalog`) cannot run until the wave is done.

use std::fmt;

use futures_util::future::join_all;
use indicatif::ProgressBar;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::catalog::{Catalog, CatalogError, CatalogStore};
use crate::processor::{ItemProcessor, ItemStatus};

/// Default number of items processed concurrently.
pub const DEFAULT_WAVE_SIZE: usize = 100;

/// Minimum wave size.
pub const MIN_WAVE_SIZE: usize = 1;

/// Maximum wave size.
pub const MAX_WAVE_SIZE: usize = 1000;

/// Errors from scheduler construction or the final checkpoint.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Wave size outside the accepted range.
    #[error("invalid wave size {value}: must be between {MIN_WAVE_SIZE} and {MAX_WAVE_SIZE}")]
    InvalidWaveSize {
        /// The rejected value.
        value: usize,
    },

    /// The end-of-run checkpoint could not be written.
    #[error("final checkpoint failed: {source}")]
    Checkpoint {
        /// Underlying catalog error.
        #[source]
        source: CatalogError,
    },
}

/// End-of-run counts, one per processed item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Items already scraped before the run.
    pub skipped: usize,
    /// Items with at least one saved file.
    pub downloaded: usize,
    /// Items without document links.
    pub audio_only: usize,
    /// Items where nothing was saved.
    pub failed: usize,
}

impl RunSummary {
    /// Counts one item status.
    pub fn record(&mut self, status: &ItemStatus) {
        match status {
            ItemStatus::Skipped => self.skipped += 1,
            ItemStatus::AudioOnly => self.audio_only += 1,
            ItemStatus::Downloaded { .. } => self.downloaded += 1,
            ItemStatus::Failed { .. } => self.failed += 1,
        }
    }

    /// Total items counted.
    #[must_use]
    pub fn total(&self) -> usize {
        self.skipped + self.downloaded + self.audio_only + self.failed
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Skipped (already downloaded): {}", self.skipped)?;
        writeln!(f, "Downloaded:                   {}", self.downloaded)?;
        writeln!(f, "Audio only:                   {}", self.audio_only)?;
        writeln!(f, "Failed:                       {}", self.failed)?;
        write!(f, "Total:                        {}", self.total())
    }
}

/// Runs every catalog item through an [`ItemProcessor`] in checkpointed waves.
#[derive(Debug)]
pub struct BatchScheduler {
    processor: ItemProcessor,
    store: CatalogStore,
    wave_size: usize,
    progress: ProgressBar,
}

impl BatchScheduler {
    /// Creates a scheduler.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidWaveSize`] if `wave_size` is outside
    /// `1..=1000`.
    pub fn new(
        processor: ItemProcessor,
        store: CatalogStore,
        wave_size: usize,
    ) -> Result<Self, SchedulerError> {
        if !(MIN_WAVE_SIZE..=MAX_WAVE_SIZE).contains(&wave_size) {
            return Err(SchedulerError::InvalidWaveSize { value: wave_size });
        }
        Ok(Self {
            processor,
            store,
            wave_size,
            progress: ProgressBar::hidden(),
        })
    }

    /// Ticks `progress` once per finished item.
    #[must_use]
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Returns the configured wave size.
    #[must_use]
    pub fn wave_size(&self) -> usize {
        self.wave_size
    }

    /// Processes every item and returns the per-status counts.
    ///
    /// A failed checkpoint between waves is logged and the run continues;
    /// the next checkpoint rewrites the whole file anyway.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Checkpoint`] if the final checkpoint fails.
    /// All item-level failures are reported through the summary instead.
    #[instrument(skip(self, catalog), fields(items = catalog.len(), wave_size = self.wave_size))]
    pub async fn run(&self, catalog: &mut Catalog) -> Result<RunSummary, SchedulerError> {
        let total = catalog.len();
        let waves = total.div_ceil(self.wave_size);
        self.progress.set_length(total as u64);

        let mut summary = RunSummary::default();
        for wave in 0..waves {
            let start = wave * self.wave_size;
            let statuses = {
                let tasks = catalog
                    .iter_mut()
                    .skip(start)
                    .take(self.wave_size)
                    .map(|(key, item)| {
                        let processor = &self.processor;
                        let progress = &self.progress;
                        async move {
                            let status = processor.process(key, item).await;
                            progress.inc(1);
                            status
                        }
                    });
                join_all(tasks).await
            };

            for status in &statuses {
                summary.record(status);
            }
            info!(
                wave = wave + 1,
                waves,
                items = statuses.len(),
                downloaded = summary.downloaded,
                failed = summary.failed,
                "wave complete"
            );

            if wave + 1 < waves
                && let Err(error) = self.store.checkpoint(catalog).await
            {
                warn!(wave = wave + 1, %error, "checkpoint failed, continuing");
            }
        }

        self.store
            .checkpoint(catalog)
            .await
            .map_err(|source| SchedulerError::Checkpoint { source })?;
        self.progress.finish();

        info!(
            skipped = summary.skipped,
            downloaded = summary.downloaded,
            audio_only = summary.audio_only,
            failed = summary.failed,
            total = summary.total(),
            "run complete"
        );
        Ok(summary)
    }
}

//! CLI entry point for the book catalog downloader.

use std::sync::Arc;

use anyhow::{Context, Result};
use bookdl_core::logging::{console_level, init_logging};
use bookdl_core::{BatchScheduler, CatalogStore, HttpClient, ItemProcessor, RetryingFetcher};
use clap::Parser;
use tracing::{debug, info};

mod app;
mod cli;
mod commands;

use app::progress_manager::build_progress_bar;
use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();
    let config = args.resolve_config().context("invalid configuration")?;

    let _log_guard = init_logging(&config.log_file, console_level(args.verbose, args.quiet))
        .with_context(|| format!("cannot open log file {}", config.log_file.display()))?;
    debug!(?args, ?config, "configuration resolved");

    let store = CatalogStore::new(&config.catalog_path);
    let mut catalog = store
        .load()
        .await
        .with_context(|| format!("cannot load catalog {}", config.catalog_path.display()))?;
    info!(
        items = catalog.len(),
        completed = catalog.completed(),
        catalog = %config.catalog_path.display(),
        "catalog loaded"
    );

    if args.dry_run {
        commands::run_dry_run_preview(&catalog);
        return Ok(());
    }

    let layout = config.layout();
    layout
        .ensure_dirs()
        .await
        .with_context(|| format!("cannot create {}", layout.root().display()))?;

    let client = HttpClient::with_settings(config.request_timeout(), config.transfer_limits())
        .context("cannot build HTTP client")?;
    let mut fetcher = RetryingFetcher::new(client, config.retry_policy());
    if let Some(max_connections) = config.max_connections {
        fetcher = fetcher.with_connection_limit(max_connections);
    }

    let processor = ItemProcessor::new(Arc::new(fetcher), layout);
    let progress = build_progress_bar(config.progress, catalog.len());
    let scheduler = BatchScheduler::new(processor, store, config.wave_size)?.with_progress(progress);

    info!(
        wave_size = scheduler.wave_size(),
        root = %config.download_root.display(),
        "starting downloads"
    );
    let summary = scheduler.run(&mut catalog).await?;

    println!("{summary}");
    Ok(())
}

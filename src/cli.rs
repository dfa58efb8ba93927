//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use bookdl_core::config::{
    ConfigError, FileConfig, RunConfig, load_file_config, resolve_default_config_path,
};

/// Download every book in a scraped catalog, resumably.
///
/// Reads the catalog JSON, fetches the preferred document (or every volume)
/// of each unfinished book, and writes progress back after each wave.
#[derive(Parser, Debug)]
#[command(name = "bookdl")]
#[command(author, version, about)]
pub struct Args {
    /// Catalog JSON file [default: books.json]
    #[arg(long, value_name = "PATH")]
    pub catalog: Option<PathBuf>,

    /// Download root directory [default: downloads]
    #[arg(short = 'o', long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Items processed concurrently per wave (1-1000) [default: 100]
    #[arg(short = 'w', long, value_parser = clap::value_parser!(u16).range(1..=1000))]
    pub wave_size: Option<u16>,

    /// Attempts per link, including the first (1-10) [default: 3]
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u8).range(1..=10))]
    pub max_retries: Option<u8>,

    /// Total per-request timeout in seconds (1-3600) [default: 60]
    #[arg(short = 't', long, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub timeout: Option<u64>,

    /// Hard cap on simultaneous connections (1-10000) [default: unlimited]
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..=10000))]
    pub max_connections: Option<u16>,

    /// Persistent log file [default: book_downloader.log]
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Config file [default: $XDG_CONFIG_HOME/bookdl/config.toml]
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Print what would be fetched without touching the network or catalog
    #[arg(long)]
    pub dry_run: bool,

    /// Show a progress bar
    #[arg(long)]
    pub progress: bool,

    /// Increase console verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only print errors to the console
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Args {
    /// Builds the run configuration: CLI flags over config file over defaults.
    ///
    /// An explicit `--config` must exist; the default location is optional.
    pub fn resolve_config(&self) -> Result<RunConfig, ConfigError> {
        let mut config = RunConfig::default();

        if let Some(file) = self.load_file_config()? {
            config.apply_file_config(&file);
        }

        if let Some(path) = &self.catalog {
            config.catalog_path.clone_from(path);
        }
        if let Some(dir) = &self.output_dir {
            config.download_root.clone_from(dir);
        }
        if let Some(path) = &self.log_file {
            config.log_file.clone_from(path);
        }
        if let Some(wave_size) = self.wave_size {
            config.wave_size = usize::from(wave_size);
        }
        if let Some(attempts) = self.max_retries {
            config.max_attempts = u32::from(attempts);
        }
        if let Some(timeout) = self.timeout {
            config.request_timeout_secs = timeout;
        }
        if let Some(max) = self.max_connections {
            config.max_connections = Some(usize::from(max));
        }
        if self.progress {
            config.progress = true;
        }

        Ok(config)
    }

    fn load_file_config(&self) -> Result<Option<FileConfig>, ConfigError> {
        if let Some(path) = &self.config {
            return load_file_config(path).map(Some);
        }
        match resolve_default_config_path() {
            Some(path) if path.exists() => load_file_config(&path).map(Some),
            _ => Ok(None),
        }
    }
}

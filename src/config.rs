//! Run configuration: design defaults, config file, and derived settings.
//!
//! Precedence is CLI flag, then config file, then [`RunConfig::default`].
//! The config file is a flat `key = value` list:
//!
//! ```text
//! # ~/.config/bookdl/config.toml
//! catalog = "books.json"
//! output_dir = "downloads"
//! wave_size = 50
//! max_attempts = 5
//! backoff_factor = 1.5
//! max_connections = 64
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::catalog::DEFAULT_CATALOG_FILE;
use crate::download::TransferLimits;
use crate::download::constants::{CHUNK_SIZE_BYTES, MAX_FILE_SIZE_BYTES, REQUEST_TIMEOUT_SECS};
use crate::download::{DEFAULT_MAX_ATTEMPTS, RetryPolicy};
use crate::processor::{DEFAULT_DOWNLOAD_ROOT, DownloadLayout};
use crate::scheduler::{DEFAULT_WAVE_SIZE, MAX_WAVE_SIZE, MIN_WAVE_SIZE};

/// Default persistent log file.
pub const DEFAULT_LOG_FILE: &str = "book_downloader.log";

/// Directory name under the user config dir.
const CONFIG_DIR_NAME: &str = "bookdl";

/// Config file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Errors loading or validating a config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Config path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A line is not `key = value`.
    #[error("invalid config syntax on line {line}: expected key = value")]
    Syntax {
        /// 1-based line number.
        line: usize,
    },

    /// A key this tool does not know.
    #[error("unknown configuration key '{key}' on line {line}")]
    UnknownKey {
        /// The key.
        key: String,
        /// 1-based line number.
        line: usize,
    },

    /// A value of the wrong type.
    #[error("invalid `{key}` value on line {line}: {reason}")]
    InvalidValue {
        /// The key.
        key: String,
        /// 1-based line number.
        line: usize,
        /// What was expected.
        reason: String,
    },

    /// A well-typed value outside its accepted range.
    #[error("invalid config value for `{key}`: {value}. Expected range: {expected}")]
    OutOfRange {
        /// The key.
        key: &'static str,
        /// The rejected value.
        value: String,
        /// Accepted range.
        expected: &'static str,
    },
}

/// Values read from a config file. Absent keys are `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileConfig {
    /// Catalog JSON path.
    pub catalog: Option<PathBuf>,
    /// Download root.
    pub output_dir: Option<PathBuf>,
    /// Persistent log file.
    pub log_file: Option<PathBuf>,
    /// Items per wave (1..=1000).
    pub wave_size: Option<usize>,
    /// Total request timeout in seconds (1..=3600).
    pub request_timeout_secs: Option<u64>,
    /// Size ceiling in bytes (>= 1).
    pub max_file_size_bytes: Option<u64>,
    /// Write buffer in bytes (1024..=16 MiB).
    pub chunk_size_bytes: Option<usize>,
    /// Attempts per link (1..=10).
    pub max_attempts: Option<u32>,
    /// First backoff delay in milliseconds (0..=600000).
    pub initial_backoff_ms: Option<u64>,
    /// Backoff multiplier (1.0..=10.0).
    pub backoff_factor: Option<f64>,
    /// Maximum random extra delay per retry in milliseconds (0..=60000).
    pub retry_jitter_ms: Option<u64>,
    /// Simultaneous connection cap (1..=10000).
    pub max_connections: Option<usize>,
    /// Show a progress bar.
    pub progress: Option<bool>,
}

impl FileConfig {
    /// Validates values against their accepted ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::OutOfRange`] for the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("wave_size", self.wave_size, MIN_WAVE_SIZE..=MAX_WAVE_SIZE, "1..=1000")?;
        check_range("request_timeout_secs", self.request_timeout_secs, 1..=3600, "1..=3600")?;
        check_range("max_file_size_bytes", self.max_file_size_bytes, 1..=u64::MAX, ">= 1")?;
        check_range("chunk_size_bytes", self.chunk_size_bytes, 1024..=16 * 1024 * 1024, "1024..=16777216")?;
        check_range("max_attempts", self.max_attempts, 1..=10, "1..=10")?;
        check_range("initial_backoff_ms", self.initial_backoff_ms, 0..=600_000, "0..=600000")?;
        check_range("retry_jitter_ms", self.retry_jitter_ms, 0..=60_000, "0..=60000")?;
        check_range("max_connections", self.max_connections, 1..=10_000, "1..=10000")?;

        if let Some(factor) = self.backoff_factor
            && !(1.0..=10.0).contains(&factor)
        {
            return Err(ConfigError::OutOfRange {
                key: "backoff_factor",
                value: factor.to_string(),
                expected: "1.0..=10.0",
            });
        }
        Ok(())
    }
}

fn check_range<T>(
    key: &'static str,
    value: Option<T>,
    range: std::ops::RangeInclusive<T>,
    expected: &'static str,
) -> Result<(), ConfigError>
where
    T: PartialOrd + ToString,
{
    match value {
        Some(value) if !range.contains(&value) => Err(ConfigError::OutOfRange {
            key,
            value: value.to_string(),
            expected,
        }),
        _ => Ok(()),
    }
}

/// Every tunable of a run, with design defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Catalog JSON path.
    pub catalog_path: PathBuf,
    /// Download root.
    pub download_root: PathBuf,
    /// Persistent log file.
    pub log_file: PathBuf,
    /// Items per wave.
    pub wave_size: usize,
    /// Total request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Size ceiling in bytes.
    pub max_file_size_bytes: u64,
    /// Write buffer in bytes.
    pub chunk_size_bytes: usize,
    /// Attempts per link.
    pub max_attempts: u32,
    /// First backoff delay in milliseconds.
    pub initial_backoff_ms: u64,
    /// Backoff multiplier.
    pub backoff_factor: f64,
    /// Maximum random extra delay per retry in milliseconds.
    pub retry_jitter_ms: u64,
    /// Optional hard cap on simultaneous connections.
    pub max_connections: Option<usize>,
    /// Show a progress bar.
    pub progress: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            catalog_path: PathBuf::from(DEFAULT_CATALOG_FILE),
            download_root: PathBuf::from(DEFAULT_DOWNLOAD_ROOT),
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
            wave_size: DEFAULT_WAVE_SIZE,
            request_timeout_secs: REQUEST_TIMEOUT_SECS,
            max_file_size_bytes: MAX_FILE_SIZE_BYTES,
            chunk_size_bytes: CHUNK_SIZE_BYTES,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff_ms: 2000,
            backoff_factor: 2.0,
            retry_jitter_ms: 0,
            max_connections: None,
            progress: false,
        }
    }
}

impl RunConfig {
    /// Overlays every value present in `file`.
    pub fn apply_file_config(&mut self, file: &FileConfig) {
        if let Some(path) = &file.catalog {
            self.catalog_path.clone_from(path);
        }
        if let Some(dir) = &file.output_dir {
            self.download_root.clone_from(dir);
        }
        if let Some(path) = &file.log_file {
            self.log_file.clone_from(path);
        }
        if let Some(value) = file.wave_size {
            self.wave_size = value;
        }
        if let Some(value) = file.request_timeout_secs {
            self.request_timeout_secs = value;
        }
        if let Some(value) = file.max_file_size_bytes {
            self.max_file_size_bytes = value;
        }
        if let Some(value) = file.chunk_size_bytes {
            self.chunk_size_bytes = value;
        }
        if let Some(value) = file.max_attempts {
            self.max_attempts = value;
        }
        if let Some(value) = file.initial_backoff_ms {
            self.initial_backoff_ms = value;
        }
        if let Some(value) = file.backoff_factor {
            self.backoff_factor = value;
        }
        if let Some(value) = file.retry_jitter_ms {
            self.retry_jitter_ms = value;
        }
        if file.max_connections.is_some() {
            self.max_connections = file.max_connections;
        }
        if let Some(value) = file.progress {
            self.progress = value;
        }
    }

    /// Retry policy built from the attempt, backoff and jitter settings.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.initial_backoff_ms),
            self.backoff_factor,
        )
        .with_jitter(Duration::from_millis(self.retry_jitter_ms))
    }

    /// Size ceiling and buffer settings.
    #[must_use]
    pub fn transfer_limits(&self) -> TransferLimits {
        TransferLimits {
            max_file_size: self.max_file_size_bytes,
            chunk_size: self.chunk_size_bytes,
        }
    }

    /// Total request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Output directory layout.
    #[must_use]
    pub fn layout(&self) -> DownloadLayout {
        DownloadLayout::new(&self.download_root)
    }
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/bookdl/config.toml`
/// 2. `$HOME/.config/bookdl/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join(CONFIG_DIR_NAME)
                .join(CONFIG_FILE_NAME),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Reads, parses and validates a config file.
///
/// # Errors
///
/// Any [`ConfigError`].
pub fn load_file_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config_str(&raw)
}

/// Parses and validates config file contents.
///
/// # Errors
///
/// Any [`ConfigError`] except [`ConfigError::Read`].
pub fn parse_config_str(raw: &str) -> Result<FileConfig, ConfigError> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line_no = line_index + 1;
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            return Err(ConfigError::Syntax { line: line_no });
        };
        let key = raw_key.trim();
        let value = raw_value.trim();
        let invalid = |reason: &str| ConfigError::InvalidValue {
            key: key.to_string(),
            line: line_no,
            reason: reason.to_string(),
        };

        match key {
            "catalog" => cfg.catalog = Some(parse_string_literal(value).map_err(invalid)?.into()),
            "output_dir" => {
                cfg.output_dir = Some(parse_string_literal(value).map_err(invalid)?.into());
            }
            "log_file" => cfg.log_file = Some(parse_string_literal(value).map_err(invalid)?.into()),
            "wave_size" => cfg.wave_size = Some(parse_integer(value).map_err(invalid)?),
            "request_timeout_secs" => {
                cfg.request_timeout_secs = Some(parse_integer(value).map_err(invalid)?);
            }
            "max_file_size_bytes" => {
                cfg.max_file_size_bytes = Some(parse_integer(value).map_err(invalid)?);
            }
            "chunk_size_bytes" => {
                cfg.chunk_size_bytes = Some(parse_integer(value).map_err(invalid)?);
            }
            "max_attempts" => cfg.max_attempts = Some(parse_integer(value).map_err(invalid)?),
            "initial_backoff_ms" => {
                cfg.initial_backoff_ms = Some(parse_integer(value).map_err(invalid)?);
            }
            "backoff_factor" => cfg.backoff_factor = Some(parse_float(value).map_err(invalid)?),
            "retry_jitter_ms" => {
                cfg.retry_jitter_ms = Some(parse_integer(value).map_err(invalid)?);
            }
            "max_connections" => {
                cfg.max_connections = Some(parse_integer(value).map_err(invalid)?);
            }
            "progress" => cfg.progress = Some(parse_boolean(value).map_err(invalid)?),
            unknown => {
                return Err(ConfigError::UnknownKey {
                    key: unknown.to_string(),
                    line: line_no,
                });
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String, &'static str> {
    raw_value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .map(str::to_string)
        .ok_or("expected double-quoted string")
}

fn parse_integer<T: std::str::FromStr>(raw_value: &str) -> Result<T, &'static str> {
    let token = raw_value.trim().replace('_', "");
    if token.is_empty() {
        return Err("expected integer value");
    }
    if token.starts_with('-') {
        return Err("expected non-negative integer");
    }
    token.parse::<T>().map_err(|_| "expected integer value in range")
}

fn parse_float(raw_value: &str) -> Result<f64, &'static str> {
    let value = raw_value
        .trim()
        .parse::<f64>()
        .map_err(|_| "expected number")?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err("expected finite number")
    }
}

fn parse_boolean(raw_value: &str) -> Result<bool, &'static str> {
    match raw_value.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err("expected true or false"),
    }
}

//! Constants for the download module (timeouts, size ceiling, chunking).

/// Total per-request timeout (60 seconds).
pub const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Connection establishment timeout; never longer than the total timeout.
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Hard ceiling on a single file (20 GiB).
pub const MAX_FILE_SIZE_BYTES: u64 = 20 * 1024 * 1024 * 1024;

/// Write buffer size for streamed bodies (64 KiB).
pub const CHUNK_SIZE_BYTES: usize = 64 * 1024;

/// Maximum filename length in characters.
pub const MAX_FILENAME_CHARS: usize = 100;

/// Maximum filename length in UTF-8 bytes. Leaves room under the usual
/// 255-byte `NAME_MAX` for the `.<name>.<pid>-<n>.part` temp name.
pub const MAX_FILENAME_BYTES: usize = 200;

/// Extension used when nothing better can be inferred.
pub const DEFAULT_DOCUMENT_EXTENSION: &str = ".pdf";

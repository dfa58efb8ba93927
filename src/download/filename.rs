//! Filename resolution and sanitization for retrieved files.
//!
//! A file's name comes from, in order:
//! 1. the RFC 5987 `filename*=` parameter of `Content-Disposition`, percent-decoded
//! 2. the plain `filename=` parameter, quoted or unquoted
//! 3. the last segment of the response URL's path
//!
//! When none of them yields a usable name, [`fallback_filename`] builds one
//! from the link label and an extension inferred from `Content-Type`.
//! Every name is stripped of filesystem-reserved characters and bounded to
//! [`MAX_FILENAME_CHARS`] characters and [`MAX_FILENAME_BYTES`] bytes.

use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE, HeaderMap};
use tracing::warn;
use url::Url;

use super::constants::{DEFAULT_DOCUMENT_EXTENSION, MAX_FILENAME_BYTES, MAX_FILENAME_CHARS};

/// Marker inserted where a long name was cut.
const ELLIPSIS: &str = "...";

/// Longest suffix still treated as an extension worth preserving.
const MAX_EXTENSION_CHARS: usize = 12;

/// Content types that say nothing about the payload.
const GENERIC_CONTENT_TYPES: &[&str] = &[
    "application/octet-stream",
    "binary/octet-stream",
    "application/force-download",
    "application/download",
];

/// Where a resolved filename came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilenameSource {
    /// `filename*=charset''percent-encoded`
    EncodedParameter,
    /// `filename="..."` or `filename=...`
    LegacyParameter,
    /// Last path segment of the response URL.
    UrlPath,
    /// Sanitized link label plus inferred extension.
    LabelFallback,
}

/// A filesystem-safe name for a retrieved file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFilename {
    /// The bounded, sanitized name.
    pub name: String,
    /// Which input produced it.
    pub source: FilenameSource,
    /// True if undecodable bytes were dropped on the way.
    pub coerced: bool,
}

/// Resolves a filename from response headers and the response URL.
///
/// Returns `None` when no candidate survives sanitization; the caller then
/// uses [`fallback_filename`].
#[must_use]
pub fn resolve_filename(headers: &HeaderMap, url: &Url) -> Option<ResolvedFilename> {
    let from_header = headers
        .get(CONTENT_DISPOSITION)
        .and_then(|value| parse_content_disposition(value.as_bytes()));

    let resolved = from_header.or_else(|| filename_from_url(url))?;
    if resolved.coerced {
        warn!(url = %url, name = %resolved.name, "filename coerced");
    }
    Some(resolved)
}

/// Builds `<sanitized label><extension>` for responses without a usable name.
#[must_use]
pub fn fallback_filename(label: &str, headers: &HeaderMap, url: &Url) -> ResolvedFilename {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());

    let stem = sanitize_component(label);
    let stem = if is_usable(&stem) { stem } else { "download".to_string() };
    let extension = infer_extension(content_type, url);

    ResolvedFilename {
        name: bound_filename(&format!("{stem}{extension}")),
        source: FilenameSource::LabelFallback,
        coerced: false,
    }
}

/// Extension chain: content type, then URL path, then a format name inside
/// the content type, then `.pdf`.
#[must_use]
pub fn infer_extension(content_type: Option<&str>, url: &Url) -> String {
    if let Some(ext) = content_type.and_then(extension_from_content_type) {
        return ext.to_string();
    }
    if let Some(ext) = extension_from_url(url) {
        return ext;
    }
    if let Some(ct) = content_type.map(str::to_lowercase) {
        for format in ["pdf", "epub", "mobi"] {
            if ct.contains(format) {
                return format!(".{format}");
            }
        }
    }
    DEFAULT_DOCUMENT_EXTENSION.to_string()
}

/// Maps a specific content type to an extension. Generic or unknown types
/// yield `None`.
#[must_use]
pub fn extension_from_content_type(content_type: &str) -> Option<&'static str> {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase();

    if GENERIC_CONTENT_TYPES.contains(&mime.as_str()) {
        return None;
    }

    match mime.as_str() {
        "application/pdf" | "application/x-pdf" => Some(".pdf"),
        "application/epub+zip" => Some(".epub"),
        "application/x-mobipocket-ebook" => Some(".mobi"),
        "application/vnd.amazon.ebook" => Some(".azw"),
        "audio/mpeg" | "audio/mp3" => Some(".mp3"),
        "audio/mp4" | "audio/x-m4a" => Some(".m4a"),
        "application/zip" | "application/x-zip-compressed" => Some(".zip"),
        "text/plain" => Some(".txt"),
        "text/html" => Some(".html"),
        _ => None,
    }
}

fn extension_from_url(url: &Url) -> Option<String> {
    let last_segment = url.path_segments()?.next_back()?;
    let dot_index = last_segment.rfind('.')?;
    let ext = &last_segment[dot_index..];
    if ext.len() <= 1 || ext.len() > MAX_EXTENSION_CHARS {
        return None;
    }
    Some(ext.to_lowercase())
}

/// Strips filesystem-reserved and control characters and trims whitespace.
#[must_use]
pub fn sanitize_component(value: &str) -> String {
    value
        .chars()
        .filter(|c| !matches!(c, '\\' | '/' | '*' | '?' | ':' | '"' | '<' | '>' | '|'))
        .filter(|c| !c.is_control())
        .collect::<String>()
        .trim()
        .to_string()
}

/// Bounds `name` to both filename limits.
#[must_use]
pub fn bound_filename(name: &str) -> String {
    truncate_with_ellipsis(name, MAX_FILENAME_CHARS, MAX_FILENAME_BYTES)
}

/// Bounds `name` to `max_chars` characters and `max_bytes` UTF-8 bytes,
/// keeping a short extension intact and marking the cut with `...`.
/// Cuts always fall on character boundaries.
#[must_use]
pub fn truncate_with_ellipsis(name: &str, max_chars: usize, max_bytes: usize) -> String {
    if name.chars().count() <= max_chars && name.len() <= max_bytes {
        return name.to_string();
    }

    // ASCII, so its char and byte lengths agree.
    let marker = ELLIPSIS.len();
    if max_chars <= marker || max_bytes <= marker {
        return prefix_within(name, max_chars, max_bytes).to_string();
    }

    let (stem, extension) = split_extension(name);
    let char_budget = max_chars.saturating_sub(marker + extension.chars().count());
    let byte_budget = max_bytes.saturating_sub(marker + extension.len());

    if char_budget == 0 || byte_budget == 0 {
        let head = prefix_within(name, max_chars - marker, max_bytes - marker);
        return format!("{head}{ELLIPSIS}");
    }

    let head = prefix_within(stem, char_budget, byte_budget);
    format!("{head}{ELLIPSIS}{extension}")
}

/// Longest prefix of `s` within both limits.
fn prefix_within(s: &str, max_chars: usize, max_bytes: usize) -> &str {
    let end = s
        .char_indices()
        .map(|(start, c)| start + c.len_utf8())
        .take(max_chars)
        .take_while(|&end| end <= max_bytes)
        .last()
        .unwrap_or(0);
    &s[..end]
}

fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(pos) if pos > 0 && name[pos..].chars().count() <= MAX_EXTENSION_CHARS => {
            (&name[..pos], &name[pos..])
        }
        _ => (name, ""),
    }
}

fn is_usable(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".."
}

/// Sanitizes and bounds a raw candidate; `None` if nothing usable remains.
fn finish(raw: &str, source: FilenameSource, coerced: bool) -> Option<ResolvedFilename> {
    let cleaned = sanitize_component(raw);
    if !is_usable(&cleaned) {
        return None;
    }
    Some(ResolvedFilename {
        name: bound_filename(&cleaned),
        source,
        coerced,
    })
}

/// Decodes bytes as UTF-8, dropping anything undecodable.
fn decode_lossy(bytes: &[u8]) -> (String, bool) {
    match std::str::from_utf8(bytes) {
        Ok(text) => (text.to_string(), false),
        Err(_) => {
            let text = String::from_utf8_lossy(bytes).replace('\u{FFFD}', "");
            (text, true)
        }
    }
}

/// Parses a `Content-Disposition` header value.
///
/// `filename*=` wins over `filename=` regardless of order. Parameter names
/// match case-insensitively.
fn parse_content_disposition(raw: &[u8]) -> Option<ResolvedFilename> {
    let (header, header_coerced) = decode_lossy(raw);
    let params = split_parameters(&header);

    let encoded = params
        .iter()
        .find(|(name, _)| name == "filename*")
        .and_then(|(_, value)| decode_extended_value(value))
        .and_then(|(name, coerced)| {
            finish(&name, FilenameSource::EncodedParameter, coerced || header_coerced)
        });
    if encoded.is_some() {
        return encoded;
    }

    params
        .iter()
        .find(|(name, _)| name == "filename")
        .and_then(|(_, value)| finish(value, FilenameSource::LegacyParameter, header_coerced))
}

/// Splits `disposition; a=b; c="d; e"` into lowercased name/value pairs,
/// honoring quotes. The disposition type itself is skipped.
fn split_parameters(header: &str) -> Vec<(String, String)> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for ch in header.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            ';' if !in_quotes => segments.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    segments.push(current);

    segments
        .iter()
        .filter_map(|segment| {
            let (name, value) = segment.split_once('=')?;
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value);
            Some((name.trim().to_ascii_lowercase(), value.to_string()))
        })
        .collect()
}

/// Decodes an RFC 5987 `charset'lang'pct-encoded` value.
fn decode_extended_value(value: &str) -> Option<(String, bool)> {
    let mut parts = value.splitn(3, '\'');
    let charset = parts.next()?;
    let _language = parts.next()?;
    let encoded = parts.next()?;

    let bytes = urlencoding::decode_binary(encoded.as_bytes());
    if charset.eq_ignore_ascii_case("iso-8859-1") {
        return Some((bytes.iter().map(|&b| char::from(b)).collect(), false));
    }
    Some(decode_lossy(&bytes))
}

fn filename_from_url(url: &Url) -> Option<ResolvedFilename> {
    let last = url.path_segments()?.next_back()?;
    if last.is_empty() {
        return None;
    }
    let (decoded, coerced) = decode_lossy(&urlencoding::decode_binary(last.as_bytes()));
    finish(&decoded, FilenameSource::UrlPath, coerced)
}

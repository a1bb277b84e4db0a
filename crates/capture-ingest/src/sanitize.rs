//! Helpers for sanitizing data before it enters log lines, span attributes
//! or filesystem paths.

use std::path::Path;

const MAX_ID_LEN: usize = 128;

/// Returns only the filename component of a path (no directory).
///
/// Safe for span fields: reveals the file name without exposing the full path.
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Returns true if `id` can be used verbatim as a single path component.
///
/// Accepts ASCII alphanumerics plus `-`, `_` and `.`, rejects a leading dot
/// (hidden entries and `..`) and anything longer than 128 bytes.
pub fn is_safe_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_ID_LEN
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

//! Content type lookup by file extension

use std::path::Path;

/// Content type used when the extension is missing or unknown
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Return the MIME type for `path` based on its extension (case-insensitive)
pub fn mime_type_for(path: impl AsRef<Path>) -> &'static str {
    mime_guess::from_path(path).first_raw().unwrap_or(DEFAULT_MIME_TYPE)
}

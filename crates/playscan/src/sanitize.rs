//! Helpers for sanitizing data before it enters tracing span attributes
//! or error messages that leave the process.
//!
//! Blob paths carry the owner id, so spans get the bare file name or a hash.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;

/// Returns only the file name component of a path.
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// [`redact_path`] for `owner/…/file` blob keys.
pub fn redact_blob_path(blob_path: &str) -> String {
    redact_path(Path::new(blob_path))
}

/// Short deterministic hash for correlating an id without exposing it.
pub fn hash_id(value: &str) -> String {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

/// Cuts `text` to at most `max_chars` characters on a char boundary,
/// appending `…` when something was removed.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_path_returns_filename() {
        assert_eq!(
            redact_path(Path::new("/home/user/scripts/hamlet.pdf")),
            "hamlet.pdf"
        );
    }

    #[test]
    fn test_redact_path_no_filename() {
        assert_eq!(redact_path(Path::new("/")), "<unknown>");
    }

    #[test]
    fn test_redact_blob_path_drops_owner() {
        assert_eq!(redact_blob_path("user-42/uploads/act1.png"), "act1.png");
    }

    #[test]
    fn test_hash_id_deterministic() {
        let h1 = hash_id("user-42");
        assert_eq!(h1, hash_id("user-42"));
        assert_eq!(h1.len(), 16);
        assert_ne!(h1, hash_id("user-43"));
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 5), "hello");
        assert_eq!(truncate_chars("hello world", 5), "hello…");
        assert_eq!(truncate_chars("ñandú", 2), "ña…");
    }
}

//! Small pure helpers

use deposit_common::config::StatusRefRewrite;

/// Replace `prefix_to_match` at the start of `url` with `replacement_prefix`
///
/// URLs not starting with the prefix are returned unchanged. An empty
/// prefix never matches.
pub fn rewrite_prefix(url: &str, prefix_to_match: &str, replacement_prefix: &str) -> String {
    match url.strip_prefix(prefix_to_match) {
        Some(rest) if !prefix_to_match.is_empty() => format!("{}{}", replacement_prefix, rest),
        _ => url.to_string(),
    }
}

/// Apply a configured status-reference rewrite, if any
pub fn rewrite_status_ref(rewrite: &StatusRefRewrite, url: &str) -> String {
    match (&rewrite.prefix_to_match, &rewrite.replacement_prefix) {
        (Some(prefix), Some(replacement)) => rewrite_prefix(url, prefix, replacement),
        _ => url.to_string(),
    }
}

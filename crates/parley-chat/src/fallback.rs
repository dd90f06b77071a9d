//! Detection of local-model failures that warrant a cloud fallback.

use regex::Regex;
use std::sync::LazyLock;

/// In-band marker the backend injects into the stream when it has already
/// switched models itself
pub const FALLBACK_MARKER: &str = "[Local model failed, switching to";

/// Signatures of a failed local generation in otherwise-final response text.
/// Matched against the whole message, case-insensitive.
static FAILURE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)local model error",
        r"(?i)connection refused",
        r"(?i)failed to establish",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Check for the backend's in-band fallback marker
pub fn contains_fallback_marker(text: &str) -> bool {
    text.contains(FALLBACK_MARKER)
}

/// Check whether final response text reads as a local-model failure
pub fn is_model_failure(text: &str) -> bool {
    FAILURE_PATTERNS.iter().any(|p| p.is_match(text))
}

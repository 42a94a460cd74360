//! Compiled regex patterns for parsing Xcode artifacts.
//!
//! These patterns are compiled once on first use and reused for every
//! artifact event. Update these when Xcode changes its naming or log format.

use once_cell::sync::Lazy;
use regex::Regex;

// ═══════════════════════════════════════════════════════════════════════════════
// Result Bundle Names
// ═══════════════════════════════════════════════════════════════════════════════

/// Start of the timestamp in `Test-Scheme-2026.02.21_14-24-35--0800.xcresult`.
pub static RE_RESULT_TIMESTAMP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-\d{4}\.\d{2}\.\d{2}_").unwrap());

// ═══════════════════════════════════════════════════════════════════════════════
// Build Log Summary Line
// ═══════════════════════════════════════════════════════════════════════════════

/// `Workspace X | Scheme Y | Destination Z` (or `Project X | ...`), one line.
pub static RE_BUILD_LOG_SUMMARY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(Workspace|Project) ([^|\n]+)\| Scheme ([^|\n]+)\| Destination ([^\n]+)").unwrap()
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_pattern_requires_full_date_and_underscore() {
        assert!(RE_RESULT_TIMESTAMP.is_match("App-2026.02.21_14-24-35"));
        assert!(!RE_RESULT_TIMESTAMP.is_match("App-2026.02.21"));
        assert!(!RE_RESULT_TIMESTAMP.is_match("App-26.02.21_14"));
    }
}

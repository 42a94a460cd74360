//! Result bundle name decoding.
//!
//! Xcode names bundles `<Action>-<Scheme>-<YYYY.MM.DD>_<HH-MM-SS><±HHMM>.xcresult`.
//! The scheme is everything between the action prefix and the first
//! `-YYYY.MM.DD_` run. Scheme names that themselves contain `-` followed by a
//! date-shaped run are split at the first such run; there is no way to tell
//! them apart from the name alone.

use crate::patterns::RE_RESULT_TIMESTAMP;
use crate::types::BuildAction;

/// Action prefixes in match order. `Run` bundles replay as builds.
const ACTION_PREFIXES: [(&str, BuildAction); 3] = [
    ("Test-", BuildAction::Test),
    ("Build-", BuildAction::Build),
    ("Run-", BuildAction::Build),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenameResult {
    pub scheme: String,
    pub action: BuildAction,
}

/// Decodes scheme and action from a result bundle file name.
///
/// Returns `None` when no action prefix applies, the timestamp is missing, or
/// the scheme would be empty.
pub fn parse_result_filename(filename: &str) -> Option<FilenameResult> {
    let name = filename.strip_suffix(".xcresult").unwrap_or(filename);

    for (prefix, action) in ACTION_PREFIXES {
        let Some(remainder) = name.strip_prefix(prefix) else {
            continue;
        };
        let Some(found) = RE_RESULT_TIMESTAMP.find(remainder) else {
            continue;
        };
        let scheme = &remainder[..found.start()];
        if scheme.is_empty() {
            continue;
        }
        return Some(FilenameResult {
            scheme: scheme.to_string(),
            action,
        });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_test_action() {
        let result = parse_result_filename("Test-PizzaCoach-2026.02.21_14-24-35--0800.xcresult")
            .expect("match");
        assert_eq!(result.scheme, "PizzaCoach");
        assert_eq!(result.action, BuildAction::Test);
    }

    #[test]
    fn parses_build_action() {
        let result =
            parse_result_filename("Build-MyApp-2026.02.21_11-03-09--0800.xcresult").expect("match");
        assert_eq!(result.scheme, "MyApp");
        assert_eq!(result.action, BuildAction::Build);
    }

    #[test]
    fn run_action_maps_to_build() {
        let result = parse_result_filename("Run-PizzaCoach-2026.02.21_11-03-09--0800.xcresult")
            .expect("match");
        assert_eq!(result.scheme, "PizzaCoach");
        assert_eq!(result.action, BuildAction::Build);
    }

    #[test]
    fn positive_timezone_offset() {
        let result =
            parse_result_filename("Test-MyApp-2026.02.21_14-24-35-+0530.xcresult").expect("match");
        assert_eq!(result.scheme, "MyApp");
    }

    #[test]
    fn hyphenated_scheme_keeps_hyphens() {
        let result = parse_result_filename("Test-My-Cool-App-2026.02.21_14-24-35--0800.xcresult")
            .expect("match");
        assert_eq!(result.scheme, "My-Cool-App");
    }

    // Known limitation: a scheme containing a date-shaped run is cut at that run.
    #[test]
    fn date_shaped_scheme_segment_is_split_at_first_match() {
        let result =
            parse_result_filename("Test-App-2025.01.01_Beta-2026.02.21_14-24-35--0800.xcresult")
                .expect("match");
        assert_eq!(result.scheme, "App");
    }

    #[test]
    fn rejects_missing_prefix() {
        assert!(parse_result_filename("garbage.xcresult").is_none());
        assert!(parse_result_filename("Archive-App-2026.02.21_14-24-35--0800.xcresult").is_none());
    }

    #[test]
    fn rejects_missing_timestamp() {
        assert!(parse_result_filename("Test-PizzaCoach.xcresult").is_none());
        assert!(parse_result_filename("Test-PizzaCoach-2026.02.21.xcresult").is_none());
    }

    #[test]
    fn rejects_empty_scheme() {
        assert!(parse_result_filename("Test--2026.02.21_14-24-35--0800.xcresult").is_none());
    }
}

//! Startup discovery of result bundles written earlier today.
//!
//! Only bundles created while the daemon is watching are seen live. On
//! startup we make one pass over each DerivedData project folder and pick up
//! today's bundles so a freshly launched daemon is not empty.

use std::path::{Path, PathBuf};

use chrono::Local;
use fs_err as fs;

use crate::types::RESULT_BUNDLE_EXTENSION;

/// Log folders, relative to a DerivedData project folder, that hold result bundles.
pub const RESULT_LOG_DIRS: [&str; 2] = ["Logs/Test", "Logs/Launch"];

/// `YYYY.MM.DD` in local time, as it appears in result bundle names.
pub fn today_stamp() -> String {
    Local::now().format("%Y.%m.%d").to_string()
}

/// Lists result bundles under `root` whose name contains `date_stamp`.
pub fn find_todays_results(root: &Path, date_stamp: &str) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(root) else {
        return Vec::new();
    };
    let mut project_dirs: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    project_dirs.sort();

    let mut results = Vec::new();
    for project_dir in project_dirs {
        for logs_dir in RESULT_LOG_DIRS {
            let Ok(contents) = fs::read_dir(project_dir.join(logs_dir)) else {
                continue;
            };
            let mut bundles: Vec<PathBuf> = contents
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| {
                    p.extension().is_some_and(|ext| ext == RESULT_BUNDLE_EXTENSION)
                        && p.file_name()
                            .is_some_and(|name| name.to_string_lossy().contains(date_stamp))
                })
                .collect();
            bundles.sort();
            results.extend(bundles);
        }
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle(root: &Path, rel: &str) -> PathBuf {
        let path = root.join(rel);
        std::fs::create_dir_all(&path).expect("bundle dir");
        path
    }

    #[test]
    fn finds_test_and_launch_results() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let root = temp_dir.path();
        let test = bundle(root, "MyApp-abc/Logs/Test/Test-MyApp-2026.02.21_14-24-35--0800.xcresult");
        let run = bundle(root, "MyApp-abc/Logs/Launch/Run-MyApp-2026.02.21_10-00-00--0800.xcresult");

        let results = find_todays_results(root, "2026.02.21");

        assert_eq!(results.len(), 2);
        assert!(results.contains(&test));
        assert!(results.contains(&run));
    }

    #[test]
    fn ignores_other_days_and_other_files() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let root = temp_dir.path();
        bundle(root, "MyApp-abc/Logs/Test/Test-MyApp-2026.02.20_14-24-35--0800.xcresult");
        std::fs::write(
            root.join("MyApp-abc/Logs/Test/LogStoreManifest-2026.02.21.plist"),
            "",
        )
        .expect("manifest");
        bundle(root, "MyApp-abc/Logs/Build/Build-MyApp-2026.02.21_14-24-35--0800.xcresult");

        assert!(find_todays_results(root, "2026.02.21").is_empty());
    }

    #[test]
    fn missing_root_is_empty() {
        assert!(find_todays_results(Path::new("/nonexistent/DerivedData"), "2026.02.21").is_empty());
    }

    #[test]
    fn today_stamp_has_dotted_date_shape() {
        let stamp = today_stamp();
        assert_eq!(stamp.len(), 10);
        assert_eq!(stamp.matches('.').count(), 2);
    }
}

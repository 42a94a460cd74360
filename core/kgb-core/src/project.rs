//! Project source resolution from DerivedData build metadata.
//!
//! Every DerivedData project folder records the project it was built from in
//! `Build/Intermediates.noindex/XCBuildData/**/<hash>-build-request.json`:
//!
//! ```json
//! { "containerPath": "/Users/dev/PizzaCoach/PizzaCoach.xcworkspace", ... }
//! ```
//!
//! The metadata is written alongside the build, so it can trail the artifact
//! that triggered the lookup. A missing descriptor is `None`, not an error.

use std::path::{Component, Path, PathBuf};

use fs_err as fs;
use serde::Deserialize;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::ExtractionError;
use crate::types::ProjectType;

const BUILD_DATA_SUBPATH: [&str; 3] = ["Build", "Intermediates.noindex", "XCBuildData"];
const BUILD_REQUEST_SUFFIX: &str = "build-request.json";
const WORKSPACE_SUFFIX: &str = ".xcworkspace";
const PROJECT_SUFFIX: &str = ".xcodeproj";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuildRequest {
    container_path: Option<String>,
}

/// Returns the DerivedData project folder (first segment under `root`) for an artifact.
///
/// When the paths disagree textually (a symlinked or relative root), both are
/// canonicalized and compared again.
pub fn project_folder(root: &Path, artifact_path: &Path) -> Option<PathBuf> {
    if let Some(folder) = first_segment_under(root, artifact_path) {
        return Some(folder);
    }
    let canonical_root = fs::canonicalize(root).ok()?;
    let canonical_artifact = fs::canonicalize(artifact_path).ok()?;
    first_segment_under(&canonical_root, &canonical_artifact)
}

fn first_segment_under(root: &Path, path: &Path) -> Option<PathBuf> {
    let relative = path.strip_prefix(root).ok()?;
    match relative.components().next()? {
        Component::Normal(name) => Some(root.join(name)),
        _ => None,
    }
}

/// Resolves the directory holding the `.xcodeproj`/`.xcworkspace` that produced an artifact.
pub fn resolve_project_source_dir(root: &Path, artifact_path: &Path) -> Option<PathBuf> {
    let mut build_data = project_folder(root, artifact_path)?;
    for segment in BUILD_DATA_SUBPATH {
        build_data.push(segment);
    }
    if !build_data.is_dir() {
        return None;
    }

    for entry in WalkDir::new(&build_data)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let is_request = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.ends_with(BUILD_REQUEST_SUFFIX));
        if !is_request {
            continue;
        }

        match read_container_path(entry.path()) {
            Some(container) => {
                return container.parent().map(Path::to_path_buf);
            }
            None => {
                debug!(path = %entry.path().display(), "Build request without containerPath");
            }
        }
    }

    None
}

fn read_container_path(path: &Path) -> Option<PathBuf> {
    let content = fs::read(path).ok()?;
    let request: BuildRequest = serde_json::from_slice(&content).ok()?;
    request
        .container_path
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
}

/// Picks the container to build in a source directory: a workspace if there is
/// one, otherwise a project.
pub fn detect_project(dir: &Path) -> Result<(PathBuf, ProjectType), ExtractionError> {
    let not_found = || ExtractionError::NoProjectFound(dir.to_path_buf());

    let mut names: Vec<String> = fs::read_dir(dir)
        .map_err(|_| not_found())?
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
        .collect();
    names.sort();

    if let Some(workspace) = names.iter().find(|n| n.ends_with(WORKSPACE_SUFFIX)) {
        return Ok((dir.join(workspace), ProjectType::Workspace));
    }
    if let Some(project) = names.iter().find(|n| n.ends_with(PROJECT_SUFFIX)) {
        return Ok((dir.join(project), ProjectType::Project));
    }
    Err(not_found())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_build_request(root: &Path, folder: &str, hash: &str, body: &str) {
        let dir = root
            .join(folder)
            .join("Build/Intermediates.noindex/XCBuildData")
            .join(hash);
        std::fs::create_dir_all(&dir).expect("build data dir");
        std::fs::write(dir.join(format!("{hash}-{BUILD_REQUEST_SUFFIX}")), body).expect("request");
    }

    #[test]
    fn resolves_container_parent() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let root = temp_dir.path();
        write_build_request(
            root,
            "MyApp-abc",
            "abc123",
            r#"{"containerPath": "/Users/dev/MyApp/MyApp.xcodeproj"}"#,
        );

        let artifact = root.join("MyApp-abc/Logs/Test/Test-MyApp-2026.02.21_14-24-35--0800.xcresult");
        let resolved = resolve_project_source_dir(root, &artifact);

        assert_eq!(resolved, Some(PathBuf::from("/Users/dev/MyApp")));
    }

    #[test]
    fn missing_metadata_is_none() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let root = temp_dir.path();
        std::fs::create_dir_all(root.join("MyApp-abc/Logs/Test")).expect("logs");

        let artifact = root.join("MyApp-abc/Logs/Test/Test-MyApp-2026.02.21.xcresult");
        assert_eq!(resolve_project_source_dir(root, &artifact), None);
    }

    #[test]
    fn skips_request_without_container_path() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let root = temp_dir.path();
        write_build_request(root, "MyApp-abc", "aaa", r#"{"other": 1}"#);
        write_build_request(
            root,
            "MyApp-abc",
            "bbb",
            r#"{"containerPath": "/Users/dev/MyApp/MyApp.xcworkspace"}"#,
        );

        let artifact = root.join("MyApp-abc/Logs/Build/x.xcactivitylog");
        assert_eq!(
            resolve_project_source_dir(root, &artifact),
            Some(PathBuf::from("/Users/dev/MyApp"))
        );
    }

    #[cfg(unix)]
    #[test]
    fn resolves_through_symlinked_root() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let real_root = temp_dir.path().join("DerivedData");
        write_build_request(
            &real_root,
            "MyApp-abc",
            "abc123",
            r#"{"containerPath": "/src/MyApp/MyApp.xcodeproj"}"#,
        );
        let bundle = real_root.join("MyApp-abc/Logs/Test/Test-MyApp-2026.02.21_14-24-35--0800.xcresult");
        std::fs::create_dir_all(&bundle).expect("bundle");
        let link_root = temp_dir.path().join("dd-link");
        std::os::unix::fs::symlink(&real_root, &link_root).expect("symlink");

        let canonical_bundle = std::fs::canonicalize(&bundle).expect("canonical bundle");
        let expected = Some(PathBuf::from("/src/MyApp"));
        assert_eq!(resolve_project_source_dir(&link_root, &canonical_bundle), expected);
        assert_eq!(
            resolve_project_source_dir(&link_root, &link_root.join("MyApp-abc/Logs/Test/Test-MyApp-2026.02.21_14-24-35--0800.xcresult")),
            expected
        );
    }

    #[test]
    fn artifact_outside_root_is_none() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        assert_eq!(
            resolve_project_source_dir(temp_dir.path(), Path::new("/elsewhere/Test-A.xcresult")),
            None
        );
    }

    #[test]
    fn detect_prefers_workspace() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let dir = temp_dir.path();
        std::fs::create_dir_all(dir.join("MyApp.xcodeproj")).expect("proj");
        std::fs::create_dir_all(dir.join("MyApp.xcworkspace")).expect("ws");

        let (path, kind) = detect_project(dir).expect("detect");
        assert_eq!(kind, ProjectType::Workspace);
        assert_eq!(path, dir.join("MyApp.xcworkspace"));
    }

    #[test]
    fn detect_falls_back_to_project() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let dir = temp_dir.path();
        std::fs::create_dir_all(dir.join("MyApp.xcodeproj")).expect("proj");
        std::fs::write(dir.join("README.md"), "hi").expect("readme");

        let (path, kind) = detect_project(dir).expect("detect");
        assert_eq!(kind, ProjectType::Project);
        assert_eq!(path, dir.join("MyApp.xcodeproj"));
    }

    #[test]
    fn detect_without_container_fails() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let err = detect_project(temp_dir.path()).unwrap_err();
        assert!(matches!(err, ExtractionError::NoProjectFound(_)));

        let err = detect_project(&temp_dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, ExtractionError::NoProjectFound(_)));
    }
}

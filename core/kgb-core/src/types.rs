//! Core types shared by the parsers, the store and the daemon.
//!
//! Field names serialize in camelCase so the persisted command list stays
//! readable by the menu bar client.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Generates a fresh, sortable identifier for commands and pending entries.
pub fn new_id() -> String {
    ulid::Ulid::new().to_string()
}

// ═══════════════════════════════════════════════════════════════════════════════
// Canonical Commands
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectType {
    Project,
    Workspace,
}

impl ProjectType {
    /// The `xcodebuild` flag that selects this container kind.
    pub fn flag(self) -> &'static str {
        match self {
            ProjectType::Project => "-project",
            ProjectType::Workspace => "-workspace",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildAction {
    Build,
    Test,
}

impl BuildAction {
    pub fn as_str(self) -> &'static str {
        match self {
            BuildAction::Build => "build",
            BuildAction::Test => "test",
        }
    }
}

impl fmt::Display for BuildAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully resolved, replayable build or test invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalCommand {
    pub id: String,
    pub project_path: String,
    pub project_type: ProjectType,
    pub scheme: String,
    pub action: BuildAction,
    pub platform: String,
    pub device_name: String,
    pub os_version: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_flagged_as_bug: bool,
}

impl CanonicalCommand {
    /// Project name derived from the project/workspace file name, without extension.
    pub fn project_name(&self) -> String {
        Path::new(&self.project_path)
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// De-duplication identity: same scheme, action and project name.
    pub fn same_key(&self, other: &CanonicalCommand) -> bool {
        self.scheme == other.scheme
            && self.action == other.action
            && self.project_name() == other.project_name()
    }

    /// Renders the `xcodebuild` invocation that reproduces this run.
    pub fn command_string(&self) -> String {
        format!(
            "xcodebuild {} {} {} -scheme {} -destination 'platform={},name={},OS={}'",
            self.action,
            self.project_type.flag(),
            self.project_path,
            self.scheme,
            self.platform,
            self.device_name,
            self.os_version
        )
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Pending Extractions
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PendingState {
    /// Extraction is being retried.
    Waiting,
    /// A build log was seen but there is no result bundle to read yet.
    BuildOnly,
    /// Terminal until the user retries or dismisses.
    Failed,
}

/// A run that has been sighted but not resolved into a [`CanonicalCommand`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingExtraction {
    pub id: String,
    pub scheme: String,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub xcresult_path: Option<PathBuf>,
    pub state: PendingState,
}

impl PendingExtraction {
    pub fn is_failed(&self) -> bool {
        self.state == PendingState::Failed
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Artifact Events
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    BuildLogCreated,
    ResultBundleCreated,
}

/// A normalized "artifact ready" signal. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactEvent {
    pub kind: ArtifactKind,
    pub path: PathBuf,
}

pub const RESULT_BUNDLE_EXTENSION: &str = "xcresult";
pub const BUILD_LOG_EXTENSION: &str = "xcactivitylog";

impl ArtifactEvent {
    /// Classifies a raw notification path.
    ///
    /// Result bundles are directories, so a trailing separator is stripped first.
    /// Anything that is neither a result bundle nor a build log is dropped.
    pub fn classify(raw: &Path) -> Option<ArtifactEvent> {
        let text = raw.to_string_lossy();
        let trimmed = text.trim_end_matches('/');

        let suffix_bundle = format!(".{RESULT_BUNDLE_EXTENSION}");
        let suffix_log = format!(".{BUILD_LOG_EXTENSION}");

        if trimmed.ends_with(&suffix_bundle) {
            return Some(ArtifactEvent {
                kind: ArtifactKind::ResultBundleCreated,
                path: PathBuf::from(trimmed),
            });
        }
        if trimmed.ends_with(&suffix_log) && !text.ends_with('/') {
            return Some(ArtifactEvent {
                kind: ArtifactKind::BuildLogCreated,
                path: PathBuf::from(trimmed),
            });
        }
        None
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Derived Views
// ═══════════════════════════════════════════════════════════════════════════════

/// Commands clustered under one project name.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectGroup {
    pub project_name: String,
    pub commands: Vec<CanonicalCommand>,
}

impl ProjectGroup {
    pub fn latest_timestamp(&self) -> Option<DateTime<Utc>> {
        self.commands.iter().map(|c| c.timestamp).max()
    }
}

/// A flagged run paired with a later run of the same scheme/action/project.
#[derive(Debug, Clone, PartialEq)]
pub struct BugReport {
    pub broken: CanonicalCommand,
    pub working: CanonicalCommand,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(project_path: &str, project_type: ProjectType) -> CanonicalCommand {
        CanonicalCommand {
            id: new_id(),
            project_path: project_path.to_string(),
            project_type,
            scheme: "PizzaCoach".to_string(),
            action: BuildAction::Test,
            platform: "iOS Simulator".to_string(),
            device_name: "iPhone 17 Pro".to_string(),
            os_version: "26.2".to_string(),
            timestamp: Utc::now(),
            is_flagged_as_bug: false,
        }
    }

    #[test]
    fn project_name_strips_extension() {
        let cmd = command("/Users/dev/PizzaCoach/PizzaCoach.xcworkspace", ProjectType::Workspace);
        assert_eq!(cmd.project_name(), "PizzaCoach");
    }

    #[test]
    fn same_key_matches_on_project_name_not_path() {
        let a = command("/Users/dev/PizzaCoach/PizzaCoach.xcworkspace", ProjectType::Workspace);
        let b = command("/Volumes/Work/PizzaCoach/PizzaCoach.xcodeproj", ProjectType::Project);
        assert!(a.same_key(&b));

        let mut build = b.clone();
        build.action = BuildAction::Build;
        assert!(!a.same_key(&build));

        let other = command("/Users/dev/Other/Other.xcworkspace", ProjectType::Workspace);
        assert!(!a.same_key(&other));
    }

    #[test]
    fn command_string_uses_workspace_flag() {
        let cmd = command("/Users/dev/PizzaCoach/PizzaCoach.xcworkspace", ProjectType::Workspace);
        assert_eq!(
            cmd.command_string(),
            "xcodebuild test -workspace /Users/dev/PizzaCoach/PizzaCoach.xcworkspace \
             -scheme PizzaCoach -destination 'platform=iOS Simulator,name=iPhone 17 Pro,OS=26.2'"
        );
    }

    #[test]
    fn command_string_uses_project_flag() {
        let cmd = command("/Users/dev/PizzaCoach/PizzaCoach.xcodeproj", ProjectType::Project);
        assert!(cmd.command_string().contains(" -project /Users/dev/PizzaCoach/PizzaCoach.xcodeproj "));
    }

    #[test]
    fn serializes_camel_case_fields() {
        let cmd = command("/p/App.xcodeproj", ProjectType::Project);
        let value = serde_json::to_value(&cmd).expect("serialize");
        assert_eq!(value["projectType"], "project");
        assert_eq!(value["action"], "test");
        assert_eq!(value["isFlaggedAsBug"], false);
        assert!(value.get("deviceName").is_some());
    }

    #[test]
    fn classify_strips_trailing_separator_for_bundles() {
        let event = ArtifactEvent::classify(Path::new(
            "/DD/App-abc/Logs/Test/Test-App-2026.02.21_14-24-35--0800.xcresult/",
        ))
        .expect("bundle");
        assert_eq!(event.kind, ArtifactKind::ResultBundleCreated);
        assert!(event.path.to_string_lossy().ends_with(".xcresult"));
    }

    #[test]
    fn classify_recognizes_build_logs() {
        let event = ArtifactEvent::classify(Path::new("/DD/App-abc/Logs/Build/ABC.xcactivitylog"))
            .expect("log");
        assert_eq!(event.kind, ArtifactKind::BuildLogCreated);
    }

    #[test]
    fn classify_drops_other_paths() {
        assert!(ArtifactEvent::classify(Path::new("/DD/App-abc/Logs/Build/LogStoreManifest.plist")).is_none());
        assert!(ArtifactEvent::classify(Path::new(
            "/DD/App-abc/Logs/Test/Test-App.xcresult/Info.plist"
        ))
        .is_none());
    }
}

//! Extraction orchestrator: one result bundle in, one canonical command out.
//!
//! Stateless and single-shot. Whether a failure is worth another attempt is
//! encoded in the returned [`ExtractionError`]; scheduling retries belongs to
//! the daemon.

use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use crate::error::ExtractionError;
use crate::manifest::parse_build_results;
use crate::project::detect_project;
use crate::result_name::parse_result_filename;
use crate::types::{new_id, CanonicalCommand};

/// Source of the raw result manifest for a bundle.
pub trait ResultQuery: Send + Sync {
    fn build_results(&self, bundle: &Path) -> Result<Vec<u8>, ExtractionError>;
}

/// Runs `xcrun xcresulttool get build-results --path <bundle>`.
#[derive(Debug, Clone, Default)]
pub struct XcresulttoolQuery;

const XCRUN_PATH: &str = "/usr/bin/xcrun";

impl ResultQuery for XcresulttoolQuery {
    fn build_results(&self, bundle: &Path) -> Result<Vec<u8>, ExtractionError> {
        let output = Command::new(XCRUN_PATH)
            .args(["xcresulttool", "get", "build-results", "--path"])
            .arg(bundle)
            .stdin(Stdio::null())
            .output()
            .map_err(|err| ExtractionError::ExternalToolFailure {
                command: "xcrun xcresulttool".to_string(),
                details: err.to_string(),
            })?;

        // An unfinished bundle makes the tool exit non-zero with nothing useful
        // on stdout; the manifest parser classifies that as not ready.
        if !output.status.success() {
            debug!(
                bundle = %bundle.display(),
                status = ?output.status.code(),
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "xcresulttool exited unsuccessfully"
            );
        }
        Ok(output.stdout)
    }
}

#[derive(Clone)]
pub struct Extractor {
    query: Arc<dyn ResultQuery>,
}

impl Extractor {
    pub fn new(query: Arc<dyn ResultQuery>) -> Self {
        Self { query }
    }

    /// Builds a command from a result bundle and the resolved project source directory.
    pub fn extract(
        &self,
        bundle: &Path,
        project_source_dir: &Path,
    ) -> Result<CanonicalCommand, ExtractionError> {
        let filename = bundle
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        let parsed = parse_result_filename(&filename)
            .ok_or_else(|| ExtractionError::MalformedFilename(filename.clone()))?;

        let manifest = self.query.build_results(bundle)?;
        let destination = parse_build_results(&manifest)?;

        let (project_path, project_type) = detect_project(project_source_dir)?;

        Ok(CanonicalCommand {
            id: new_id(),
            project_path: project_path.to_string_lossy().to_string(),
            project_type,
            scheme: parsed.scheme,
            action: parsed.action,
            platform: destination.platform,
            device_name: destination.device_name,
            os_version: destination.os_version,
            timestamp: Utc::now(),
            is_flagged_as_bug: false,
        })
    }
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(Arc::new(XcresulttoolQuery))
    }
}

//! Error types for kgb-core operations.
//!
//! [`ExtractionError`] is the pipeline taxonomy: it is the only place that
//! decides whether an extraction attempt is worth repeating.
//! [`KgbError`] covers configuration and persistence.

use std::path::PathBuf;

// ═══════════════════════════════════════════════════════════════════════════════
// Extraction Errors
// ═══════════════════════════════════════════════════════════════════════════════

/// Why a single extraction attempt did not produce a command.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionError {
    /// The bundle name does not follow `<Action>-<Scheme>-<date>_<time><tz>.xcresult`.
    #[error("Malformed result bundle name: {0}")]
    MalformedFilename(String),

    /// No `.xcworkspace` or `.xcodeproj` next to the resolved source directory.
    #[error("No project or workspace found in {}", .0.display())]
    NoProjectFound(PathBuf),

    /// The result manifest is absent or incomplete; Xcode may still be writing it.
    #[error("Result manifest not ready: {0}")]
    ContentNotReady(String),

    /// The result manifest is present but has a shape we cannot read.
    #[error("Result manifest malformed: {0}")]
    ContentMalformed(String),

    /// The external tool could not be run at all.
    #[error("External tool failed: {command}: {details}")]
    ExternalToolFailure { command: String, details: String },
}

impl ExtractionError {
    /// Returns true when a later attempt may succeed without outside intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExtractionError::ContentNotReady(_))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Configuration / Persistence Errors
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum KgbError {
    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Configuration file malformed: {}: {details}", .path.display())]
    ConfigMalformed { path: PathBuf, details: String },

    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, KgbError>;

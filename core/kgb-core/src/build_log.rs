//! Build log (`.xcactivitylog`) summary parsing.
//!
//! Activity logs are gzip-compressed. Decompression goes through the system
//! `gunzip` so the daemon never links a decoder for a format it only skims.
//! Any failure along the way is "no result", never an error: a log that
//! cannot be read simply does not announce a pending run.

use std::path::Path;
use std::process::{Command, Stdio};

use tracing::debug;

use crate::patterns::RE_BUILD_LOG_SUMMARY;

/// Summary of the run a build log belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildLogInfo {
    pub scheme: String,
    pub destination: String,
    pub project_name: String,
    pub is_workspace: bool,
}

/// Extracts the run summary from decompressed log text.
///
/// The first `Workspace|Project <name> | Scheme <scheme> | Destination <dest>`
/// line wins; logs may repeat the summary for other purposes later on.
pub fn parse_build_log(text: &str) -> Option<BuildLogInfo> {
    let caps = RE_BUILD_LOG_SUMMARY.captures(text)?;

    let kind = caps.get(1)?.as_str();
    let project_name = caps.get(2)?.as_str().trim().to_string();
    let scheme = caps.get(3)?.as_str().trim().to_string();

    let raw_destination = caps.get(4)?.as_str();
    let destination = raw_destination
        .split_once(" -")
        .map(|(head, _)| head)
        .unwrap_or(raw_destination)
        .trim()
        .to_string();

    Some(BuildLogInfo {
        scheme,
        destination,
        project_name,
        is_workspace: kind == "Workspace",
    })
}

pub trait Decompressor: Send + Sync {
    /// Returns the decompressed bytes, or `None` if the file could not be read.
    fn decompress(&self, path: &Path) -> Option<Vec<u8>>;
}

#[derive(Debug, Clone, Default)]
pub struct GunzipDecompressor;

const GUNZIP_PATH: &str = "/usr/bin/gunzip";

impl Decompressor for GunzipDecompressor {
    fn decompress(&self, path: &Path) -> Option<Vec<u8>> {
        let output = Command::new(GUNZIP_PATH)
            .arg("-c")
            .arg(path)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output();

        match output {
            Ok(output) if output.status.success() => Some(output.stdout),
            Ok(output) => {
                debug!(path = %path.display(), status = ?output.status.code(), "gunzip exited unsuccessfully");
                None
            }
            Err(err) => {
                debug!(path = %path.display(), error = %err, "Failed to run gunzip");
                None
            }
        }
    }
}

/// Decompresses and parses a build log.
pub fn parse_build_log_file(path: &Path, decompressor: &dyn Decompressor) -> Option<BuildLogInfo> {
    let bytes = decompressor.decompress(path)?;
    let text = String::from_utf8(bytes).ok()?;
    parse_build_log(&text)
}

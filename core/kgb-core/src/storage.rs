//! File-backed persistence of the resolved command list.
//!
//! The file is a plain JSON array of commands in display order:
//!
//! ```json
//! [
//!   { "id": "01J...", "projectPath": "/Users/dev/App/App.xcodeproj", "projectType": "project",
//!     "scheme": "App", "action": "test", "platform": "iOS Simulator",
//!     "deviceName": "iPhone 17 Pro", "osVersion": "26.2",
//!     "timestamp": "2026-02-21T22:24:35Z", "isFlaggedAsBug": false }
//! ]
//! ```
//!
//! Reads are forgiving: a missing, empty or corrupt file loads as an empty
//! list. Writes go through a temp file in the same directory and a rename, so
//! a crash mid-save never leaves a partial file behind.

use std::io::Write;
use std::path::Path;

use fs_err as fs;
use tempfile::NamedTempFile;
use tracing::warn;

use crate::error::{KgbError, Result};
use crate::types::CanonicalCommand;

pub fn load_commands(path: &Path) -> Result<Vec<CanonicalCommand>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => {
            return Err(KgbError::Io {
                context: format!("reading {}", path.display()),
                source: err,
            })
        }
    };

    if content.trim().is_empty() {
        warn!(path = %path.display(), "Empty command file, starting with no commands");
        return Ok(Vec::new());
    }

    match serde_json::from_str::<Vec<CanonicalCommand>>(&content) {
        Ok(commands) => Ok(commands),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Failed to parse command file, starting with no commands");
            Ok(Vec::new())
        }
    }
}

pub fn save_commands(path: &Path, commands: &[CanonicalCommand]) -> Result<()> {
    let parent = path.parent().ok_or_else(|| KgbError::Io {
        context: format!("{} has no parent directory", path.display()),
        source: std::io::Error::from(std::io::ErrorKind::InvalidInput),
    })?;
    fs::create_dir_all(parent).map_err(|err| KgbError::Io {
        context: format!("creating {}", parent.display()),
        source: err,
    })?;

    let content = serde_json::to_string_pretty(commands).map_err(|err| KgbError::Json {
        context: "serializing commands".to_string(),
        source: err,
    })?;

    let io_err = |context: &str, source: std::io::Error| KgbError::Io {
        context: format!("{context} {}", path.display()),
        source,
    };
    let mut temp_file = NamedTempFile::new_in(parent).map_err(|e| io_err("creating temp file for", e))?;
    temp_file
        .write_all(content.as_bytes())
        .map_err(|e| io_err("writing", e))?;
    temp_file.flush().map_err(|e| io_err("flushing", e))?;
    temp_file
        .persist(path)
        .map_err(|e| io_err("replacing", e.error))?;

    Ok(())
}

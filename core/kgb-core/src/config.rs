//! Configuration loading and path defaults.
//!
//! Handles paths and settings for:
//! - The watched DerivedData root
//! - The persisted command list
//! - Watcher latency and retry pacing
//!
//! Settings live in `~/.kgb/config.toml`. Every key is optional:
//!
//! ```toml
//! watched_root = "/Volumes/Fast/DerivedData"
//! store_path = "/Users/dev/.kgb/commands.json"
//! backfill = true
//!
//! [watcher]
//! latency_ms = 1000
//!
//! [retry]
//! max_attempts = 12
//! delay_secs = 5
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use fs_err as fs;
use serde::{Deserialize, Serialize};

use crate::error::{KgbError, Result};

const KGB_DIR: &str = ".kgb";
const CONFIG_FILE: &str = "config.toml";
const STORE_FILE: &str = "commands.json";
const DERIVED_DATA_SUBPATH: &str = "Library/Developer/Xcode/DerivedData";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Coalescing window for file system notifications.
    pub latency_ms: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self { latency_ms: 1000 }
    }
}

impl WatcherConfig {
    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub delay_secs: u64,
}

impl Default for RetryConfig {
    // 12 x 5s: roughly a minute for xcresulttool to see the finished bundle.
    fn default() -> Self {
        Self {
            max_attempts: 12,
            delay_secs: 5,
        }
    }
}

impl RetryConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KgbConfig {
    pub watched_root: Option<PathBuf>,
    pub store_path: Option<PathBuf>,
    pub backfill: bool,
    pub watcher: WatcherConfig,
    pub retry: RetryConfig,
}

impl Default for KgbConfig {
    fn default() -> Self {
        Self {
            watched_root: None,
            store_path: None,
            backfill: true,
            watcher: WatcherConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl KgbConfig {
    /// The configured DerivedData root, or `~/Library/Developer/Xcode/DerivedData`.
    pub fn watched_root(&self) -> Result<PathBuf> {
        match &self.watched_root {
            Some(path) => Ok(expand_tilde(path)),
            None => default_watched_root(),
        }
    }

    /// The configured command list path, or `~/.kgb/commands.json`.
    pub fn store_path(&self) -> Result<PathBuf> {
        match &self.store_path {
            Some(path) => Ok(expand_tilde(path)),
            None => Ok(kgb_dir()?.join(STORE_FILE)),
        }
    }
}

/// Returns the KGB state directory (`~/.kgb`).
pub fn kgb_dir() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(KGB_DIR))
        .ok_or(KgbError::HomeDirNotFound)
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(kgb_dir()?.join(CONFIG_FILE))
}

pub fn default_watched_root() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(DERIVED_DATA_SUBPATH))
        .ok_or(KgbError::HomeDirNotFound)
}

/// Loads the configuration, returning defaults if the file doesn't exist.
pub fn load_config(path: Option<&Path>) -> Result<KgbConfig> {
    let config_path = match path {
        Some(path) => path.to_path_buf(),
        None => default_config_path()?,
    };

    if !config_path.exists() {
        return Ok(KgbConfig::default());
    }

    let content = fs::read_to_string(&config_path).map_err(|err| KgbError::Io {
        context: format!("reading {}", config_path.display()),
        source: err,
    })?;
    toml::from_str::<KgbConfig>(&content).map_err(|err| KgbError::ConfigMalformed {
        path: config_path,
        details: err.to_string(),
    })
}

fn expand_tilde(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

/// Resolves the watched root to the absolute, symlink-free path the OS
/// notifier reports, so artifact paths can be matched against it by prefix.
pub fn canonical_root(path: &Path) -> Result<PathBuf> {
    fs::canonicalize(expand_tilde(path)).map_err(|source| KgbError::Io {
        context: "canonicalize watched root".to_string(),
        source,
    })
}

/// Abbreviates the home directory to `~` for display.
pub fn tilde_abbreviated(path: &Path) -> String {
    match dirs::home_dir().and_then(|home| path.strip_prefix(home).ok().map(Path::to_path_buf)) {
        Some(rest) if rest.as_os_str().is_empty() => "~".to_string(),
        Some(rest) => format!("~/{}", rest.display()),
        None => path.display().to_string(),
    }
}

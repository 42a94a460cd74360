//! # kgb-core
//!
//! Core library for KGB ("Known Good Build"): turns the artifacts Xcode leaves
//! in DerivedData into replayable `xcodebuild` invocations.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime dependency. The daemon wraps the slow
//!   parts (external tools, retries) in its own tasks.
//! - **Not thread-safe**: [`CommandStore`] is a plain value. The daemon gives it
//!   a single owner and talks to that owner through messages.
//! - **Graceful degradation**: Metadata that is not written yet yields empty
//!   results, not errors. Only [`ExtractionError`] decides what is retryable.
//!
//! ## Pipeline
//!
//! ```text
//! .xcactivitylog ──► build_log::parse_build_log_file ──► pending (buildOnly)
//! .xcresult ──────► result_name::parse_result_filename ─► pending (waiting)
//!                        │
//!                        ▼
//!   project::resolve_project_source_dir + Extractor::extract ──► CommandStore
//! ```

pub mod backfill;
pub mod bug_report;
pub mod build_log;
pub mod config;
pub mod error;
pub mod extractor;
pub mod manifest;
pub mod patterns;
pub mod project;
pub mod result_name;
pub mod storage;
pub mod store;
pub mod types;

pub use backfill::{find_todays_results, today_stamp};
pub use bug_report::{compose_body, compose_subject};
pub use build_log::{
    parse_build_log, parse_build_log_file, BuildLogInfo, Decompressor, GunzipDecompressor,
};
pub use config::{canonical_root, load_config, KgbConfig, RetryConfig, WatcherConfig};
pub use error::{ExtractionError, KgbError, Result};
pub use extractor::{Extractor, ResultQuery, XcresulttoolQuery};
pub use manifest::{parse_build_results, DestinationInfo};
pub use project::{detect_project, resolve_project_source_dir};
pub use result_name::{parse_result_filename, FilenameResult};
pub use storage::{load_commands, save_commands};
pub use store::{find_bug_report, group_by_project, CommandStore, StoreSnapshot};
pub use types::*;

//! Logging setup: stderr plus a daily rolling file under `~/.kgb/logs`.
//!
//! Set `KGB_DEBUG_LOG=1` to force debug output; otherwise `RUST_LOG` applies,
//! falling back to `info`.

use std::env;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const LOG_FILE_PREFIX: &str = "kgb-daemon.log";

/// Installs the global subscriber. Keep the returned guard alive so buffered
/// file output is flushed on exit; `None` means only stderr is logged.
pub fn init() -> Option<WorkerGuard> {
    let filter = if debug_enabled(env::var("KGB_DEBUG_LOG").ok().as_deref()) {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let stderr_layer = fmt::layer().with_writer(std::io::stderr);

    let log_dir = kgb_core::config::kgb_dir().ok().map(|dir| dir.join("logs"));
    let log_dir = log_dir.filter(|dir| fs_err::create_dir_all(dir).is_ok());

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file_layer = fmt::layer().with_ansi(false).with_writer(writer);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(file_layer)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .init();
            None
        }
    }
}

fn debug_enabled(value: Option<&str>) -> bool {
    value.is_some_and(|v| matches!(v, "1" | "true" | "TRUE" | "yes" | "YES"))
}

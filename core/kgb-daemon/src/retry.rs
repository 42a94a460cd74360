//! Retry loop for one pending extraction.
//!
//! A loop owns nothing shared. Each attempt re-resolves the project source
//! directory (Xcode may still be writing build metadata) and runs the
//! extractor on the blocking pool. The loop reports a single terminal
//! [`LoopOutcome`], or `None` when it was cancelled.

use std::path::{Path, PathBuf};
use std::time::Duration;

use kgb_core::{
    resolve_project_source_dir, CanonicalCommand, ExtractionError, Extractor, RetryConfig,
};
use tokio::sync::watch;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            delay: config.delay(),
        }
    }
}

/// Runs a single extraction attempt for a bundle under a watched root.
#[derive(Clone)]
pub struct AttemptRunner {
    root: PathBuf,
    extractor: Extractor,
}

impl AttemptRunner {
    pub fn new(root: PathBuf, extractor: Extractor) -> Self {
        Self { root, extractor }
    }

    pub fn run(&self, bundle: &Path) -> Result<CanonicalCommand, ExtractionError> {
        let source_dir = resolve_project_source_dir(&self.root, bundle).ok_or_else(|| {
            ExtractionError::ContentNotReady("build metadata not written yet".to_string())
        })?;
        self.extractor.extract(bundle, &source_dir)
    }
}

#[derive(Debug)]
pub enum LoopOutcome {
    Resolved(CanonicalCommand),
    Exhausted { attempts: u32 },
    Fatal(ExtractionError),
}

pub fn cancel_requested(cancel_rx: &watch::Receiver<bool>) -> bool {
    *cancel_rx.borrow()
}

pub async fn run_retry_loop(
    pending_id: &str,
    bundle: PathBuf,
    runner: AttemptRunner,
    policy: RetryPolicy,
    mut cancel_rx: watch::Receiver<bool>,
) -> Option<LoopOutcome> {
    for attempt in 1..=policy.max_attempts {
        if cancel_requested(&cancel_rx) {
            debug!(pending_id, attempt, "Retry loop cancelled");
            return None;
        }

        let attempt_runner = runner.clone();
        let attempt_bundle = bundle.clone();
        let result = tokio::task::spawn_blocking(move || attempt_runner.run(&attempt_bundle))
            .await
            .unwrap_or_else(|err| {
                Err(ExtractionError::ExternalToolFailure {
                    command: "extraction worker".to_string(),
                    details: err.to_string(),
                })
            });

        // An attempt that was in flight when cancellation arrived is dropped.
        if cancel_requested(&cancel_rx) {
            debug!(pending_id, attempt, "Discarded attempt from cancelled loop");
            return None;
        }

        match result {
            Ok(command) => {
                info!(pending_id, attempt, scheme = %command.scheme, "Extraction succeeded");
                return Some(LoopOutcome::Resolved(command));
            }
            Err(err) if err.is_retryable() => {
                debug!(pending_id, attempt, error = %err, "Extraction not ready");
            }
            Err(err) => {
                return Some(LoopOutcome::Fatal(err));
            }
        }

        if attempt < policy.max_attempts {
            tokio::select! {
                _ = tokio::time::sleep(policy.delay) => {}
                changed = cancel_rx.changed() => {
                    if changed.is_err() {
                        debug!(pending_id, "Retry loop owner went away");
                        return None;
                    }
                }
            }
        }
    }

    Some(LoopOutcome::Exhausted {
        attempts: policy.max_attempts,
    })
}

//! Artifact pipeline: one short-lived task per detected artifact.
//!
//! Parsing happens here, off the coordinator. Only the parsed facts (a scheme
//! and destination, or a bundle path and scheme) are sent on for mutation.

use std::sync::Arc;

use kgb_core::{
    parse_build_log_file, parse_result_filename, ArtifactEvent, ArtifactKind, Decompressor,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::coordinator::CoordinatorHandle;

pub fn spawn_pipeline(
    mut events: mpsc::UnboundedReceiver<ArtifactEvent>,
    handle: CoordinatorHandle,
    decompressor: Arc<dyn Decompressor>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            tokio::spawn(handle_event(event, handle.clone(), Arc::clone(&decompressor)));
        }
        debug!("Artifact pipeline drained");
    })
}

async fn handle_event(
    event: ArtifactEvent,
    handle: CoordinatorHandle,
    decompressor: Arc<dyn Decompressor>,
) {
    let result = match event.kind {
        ArtifactKind::BuildLogCreated => on_build_log(event, handle, decompressor).await,
        ArtifactKind::ResultBundleCreated => on_result_bundle(event, handle),
    };
    if let Err(err) = result {
        warn!(error = %err, "Artifact dropped");
    }
}

async fn on_build_log(
    event: ArtifactEvent,
    handle: CoordinatorHandle,
    decompressor: Arc<dyn Decompressor>,
) -> Result<(), String> {
    let path = event.path.clone();
    let info = tokio::task::spawn_blocking(move || {
        parse_build_log_file(&path, decompressor.as_ref())
    })
    .await
    .map_err(|err| format!("Build log parser task failed: {}", err))?;

    match info {
        Some(info) => {
            debug!(
                scheme = %info.scheme,
                destination = %info.destination,
                project = %info.project_name,
                "Build log parsed"
            );
            handle.build_log_seen(info.scheme, Some(info.destination))
        }
        None => {
            debug!(path = %event.path.display(), "Build log without a summary line");
            Ok(())
        }
    }
}

fn on_result_bundle(event: ArtifactEvent, handle: CoordinatorHandle) -> Result<(), String> {
    let filename = event
        .path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();

    // No pending entry exists yet, so a bad filename is only logged.
    let Some(parsed) = parse_result_filename(&filename) else {
        return Err(format!("Unrecognized result bundle name: {}", filename));
    };

    handle.bundle_seen(event.path, parsed.scheme)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::Coordinator;
    use crate::retry::{AttemptRunner, RetryPolicy};
    use kgb_core::{CommandStore, Extractor, PendingState, StoreSnapshot};
    use std::path::{Path, PathBuf};
    use std::time::Duration;
    use tokio::time::timeout;

    /// Serves the given text as the decompressed log for any path.
    struct PlainText(&'static str);

    impl Decompressor for PlainText {
        fn decompress(&self, _path: &Path) -> Option<Vec<u8>> {
            Some(self.0.as_bytes().to_vec())
        }
    }

    const LOG_TEXT: &str = "Build target PizzaCoach\nWorkspace PizzaCoach | Scheme PizzaCoach | Destination iPhone 16 Pro - iOS 18.2\n";

    fn spawn(root: &Path) -> (CoordinatorHandle, mpsc::UnboundedSender<ArtifactEvent>) {
        let runner = AttemptRunner::new(root.to_path_buf(), Extractor::default());
        let policy = RetryPolicy {
            max_attempts: 1,
            delay: Duration::from_millis(1),
        };
        let (handle, _task) = Coordinator::spawn(CommandStore::new(), None, runner, policy);
        let (tx, rx) = mpsc::unbounded_channel();
        spawn_pipeline(rx, handle.clone(), Arc::new(PlainText(LOG_TEXT)));
        (handle, tx)
    }

    async fn wait_for(
        handle: &CoordinatorHandle,
        predicate: impl FnMut(&StoreSnapshot) -> bool,
    ) -> StoreSnapshot {
        let mut rx = handle.subscribe();
        let snapshot = timeout(Duration::from_secs(5), rx.wait_for(predicate))
            .await
            .expect("timed out")
            .expect("coordinator stopped");
        snapshot.clone()
    }

    #[tokio::test]
    async fn build_log_creates_build_only_entry() {
        let root = tempfile::tempdir().expect("temp dir");
        let (handle, tx) = spawn(root.path());

        tx.send(ArtifactEvent {
            kind: ArtifactKind::BuildLogCreated,
            path: root.path().join("PizzaCoach-hash/Logs/Build/A1.xcactivitylog"),
        })
        .unwrap();

        let snapshot = wait_for(&handle, |s| !s.pending.is_empty()).await;
        let pending = &snapshot.pending[0];
        assert_eq!(pending.scheme, "PizzaCoach");
        assert_eq!(pending.destination.as_deref(), Some("iPhone 16 Pro"));
        assert_eq!(pending.state, PendingState::BuildOnly);
    }

    #[tokio::test]
    async fn badly_named_bundle_never_becomes_pending() {
        let root = tempfile::tempdir().expect("temp dir");
        let (handle, tx) = spawn(root.path());

        tx.send(ArtifactEvent {
            kind: ArtifactKind::ResultBundleCreated,
            path: PathBuf::from("/dd/App-hash/Logs/Test/Archive-App.xcresult"),
        })
        .unwrap();
        tx.send(ArtifactEvent {
            kind: ArtifactKind::ResultBundleCreated,
            path: root
                .path()
                .join("App-hash/Logs/Test/Test-App-2026.02.21_14-24-35--0800.xcresult"),
        })
        .unwrap();

        // The well-formed bundle has no build metadata, so its single attempt fails.
        let snapshot = wait_for(&handle, |s| s.pending.iter().any(|p| p.is_failed())).await;
        assert_eq!(snapshot.pending.len(), 1);
        assert_eq!(snapshot.pending[0].scheme, "App");
    }
}

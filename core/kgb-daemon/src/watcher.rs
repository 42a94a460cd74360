//! DerivedData watcher.
//!
//! Recursively watches the root and turns file-system notifications into
//! [`ArtifactEvent`]s. Only paths that end in `.xcresult` or `.xcactivitylog`
//! get through. Repeated notifications for the same path are coalesced: an
//! event is emitted once the path has been quiet for the latency window.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use kgb_core::ArtifactEvent;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

enum WatchMessage {
    FsEvent(PathBuf),
    Ready(ArtifactEvent),
}

struct Running {
    // Dropping the watcher releases the OS resources behind it.
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

pub struct ArtifactWatcher {
    root: PathBuf,
    latency: Duration,
    running: Option<Running>,
}

impl ArtifactWatcher {
    pub fn new(root: PathBuf, latency: Duration) -> Self {
        Self {
            root,
            latency,
            running: None,
        }
    }

    /// Starts delivering events to `events`. Calling this while running does nothing.
    pub fn start(&mut self, events: mpsc::UnboundedSender<ArtifactEvent>) -> notify::Result<()> {
        if self.running.is_some() {
            return Ok(());
        }

        let (tx, rx) = mpsc::unbounded_channel::<WatchMessage>();
        let watcher_tx = tx.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    if !matches_supported_event_kind(&event.kind) {
                        return;
                    }
                    for path in event.paths {
                        let _ = watcher_tx.send(WatchMessage::FsEvent(path));
                    }
                }
                Err(err) => {
                    warn!(error = %err, "DerivedData watcher event error");
                }
            },
            notify::Config::default(),
        )?;
        watcher.watch(&self.root, RecursiveMode::Recursive)?;

        let task = tokio::spawn(debounce_loop(rx, tx, events, self.latency));
        info!(root = %self.root.display(), latency_ms = self.latency.as_millis() as u64, "DerivedData watcher started");

        self.running = Some(Running {
            _watcher: watcher,
            task,
        });
        Ok(())
    }

    /// Stops watching. Calling this while stopped does nothing.
    pub fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            running.task.abort();
            info!(root = %self.root.display(), "DerivedData watcher stopped");
        }
    }
}

impl Drop for ArtifactWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn matches_supported_event_kind(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Any
    )
}

async fn debounce_loop(
    mut rx: mpsc::UnboundedReceiver<WatchMessage>,
    tx: mpsc::UnboundedSender<WatchMessage>,
    events: mpsc::UnboundedSender<ArtifactEvent>,
    latency: Duration,
) {
    let mut pending: HashMap<PathBuf, JoinHandle<()>> = HashMap::new();

    while let Some(message) = rx.recv().await {
        match message {
            WatchMessage::FsEvent(path) => {
                let Some(event) = ArtifactEvent::classify(&path) else {
                    continue;
                };
                if let Some(previous) = pending.remove(&event.path) {
                    previous.abort();
                }
                let key = event.path.clone();
                let ready_tx = tx.clone();
                let handle = tokio::spawn(async move {
                    tokio::time::sleep(latency).await;
                    let _ = ready_tx.send(WatchMessage::Ready(event));
                });
                pending.insert(key, handle);
            }
            WatchMessage::Ready(event) => {
                pending.remove(&event.path);
                debug!(kind = ?event.kind, path = %event.path.display(), "Artifact detected");
                if events.send(event).is_err() {
                    break;
                }
            }
        }
    }

    for (_, handle) in pending.drain() {
        handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kgb_core::ArtifactKind;
    use tokio::time::timeout;

    const LATENCY: Duration = Duration::from_millis(50);

    async fn feed(paths: &[&str]) -> Vec<ArtifactEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(debounce_loop(rx, tx.clone(), events_tx, LATENCY));

        for path in paths {
            tx.send(WatchMessage::FsEvent(PathBuf::from(path))).unwrap();
        }

        let mut seen = Vec::new();
        while let Ok(Some(event)) = timeout(LATENCY * 4, events_rx.recv()).await {
            seen.push(event);
        }
        task.abort();
        seen
    }

    #[tokio::test]
    async fn coalesces_repeated_notifications_for_one_path() {
        let seen = feed(&[
            "/dd/App-hash/Logs/Test/Test-App-2026.02.21_14-24-35--0800.xcresult",
            "/dd/App-hash/Logs/Test/Test-App-2026.02.21_14-24-35--0800.xcresult/",
            "/dd/App-hash/Logs/Test/Test-App-2026.02.21_14-24-35--0800.xcresult",
        ])
        .await;

        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].kind, ArtifactKind::ResultBundleCreated);
    }

    #[tokio::test]
    async fn drops_unrelated_paths() {
        let seen = feed(&[
            "/dd/App-hash/Logs/Build/LogStoreManifest.plist",
            "/dd/App-hash/Logs/Test/Test-App.xcresult/Info.plist",
            "/dd/App-hash/Logs/Build/ABC.xcactivitylog",
        ])
        .await;

        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].kind, ArtifactKind::BuildLogCreated);
        assert_eq!(seen[0].path, PathBuf::from("/dd/App-hash/Logs/Build/ABC.xcactivitylog"));
    }

    #[tokio::test]
    async fn start_and_stop_are_idempotent() {
        let root = tempfile::tempdir().expect("temp dir");
        let mut watcher = ArtifactWatcher::new(root.path().to_path_buf(), LATENCY);
        let (events_tx, _events_rx) = mpsc::unbounded_channel();

        watcher.start(events_tx.clone()).expect("start");
        watcher.start(events_tx).expect("second start");
        assert!(watcher.running.is_some());

        watcher.stop();
        watcher.stop();
        assert!(watcher.running.is_none());
    }

    #[tokio::test]
    async fn reports_bundle_created_on_disk() {
        let root = tempfile::tempdir().expect("temp dir");
        let logs = root.path().join("App-hash/Logs/Test");
        std::fs::create_dir_all(&logs).expect("logs dir");

        let mut watcher = ArtifactWatcher::new(root.path().to_path_buf(), LATENCY);
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        watcher.start(events_tx).expect("start");
        tokio::time::sleep(Duration::from_millis(100)).await;

        let bundle = logs.join("Test-App-2026.02.21_14-24-35--0800.xcresult");
        std::fs::create_dir_all(bundle.join("Data")).expect("bundle");

        let event = timeout(Duration::from_secs(5), events_rx.recv())
            .await
            .expect("timed out")
            .expect("watcher closed");
        assert_eq!(event.kind, ArtifactKind::ResultBundleCreated);
        assert_eq!(
            event.path.file_name(),
            bundle.file_name()
        );

        watcher.stop();
    }
}

//! Startup backfill: replays today's result bundles through the pipeline.

use std::path::Path;

use kgb_core::{find_todays_results, today_stamp, ArtifactEvent, ArtifactKind};
use tokio::sync::mpsc;
use tracing::info;

/// Queues every result bundle from today under `root` as if it had just been created.
pub fn run(root: &Path, events: &mpsc::UnboundedSender<ArtifactEvent>) -> usize {
    let stamp = today_stamp();
    let bundles = find_todays_results(root, &stamp);
    let mut queued = 0usize;

    for path in bundles {
        let event = ArtifactEvent {
            kind: ArtifactKind::ResultBundleCreated,
            path,
        };
        if events.send(event).is_err() {
            break;
        }
        queued += 1;
    }

    info!(root = %root.display(), date = %stamp, queued, "Backfill complete");
    queued
}

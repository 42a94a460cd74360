//! Single-writer coordinator.
//!
//! The coordinator task is the only owner of the [`CommandStore`]. Watchers,
//! retry loops and the CLI talk to it through [`CoordinatorHandle`], and
//! readers get [`StoreSnapshot`]s from a `watch` channel instead of references.
//!
//! Every retry loop is registered under its pending id with a generation
//! number and a cancellation signal. Outcomes from a loop that was cancelled
//! or replaced are dropped on arrival, so a late attempt never mutates state.
//!
//! The command list is saved by a separate writer task on the blocking pool.
//! Only the newest queued list is written, and shutdown waits for it.

use std::collections::HashMap;
use std::path::PathBuf;

use kgb_core::{save_commands, CanonicalCommand, CommandStore, PendingState, StoreSnapshot};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::retry::{run_retry_loop, AttemptRunner, LoopOutcome, RetryPolicy};

#[derive(Debug)]
pub enum CoordinatorMessage {
    BuildLogSeen {
        scheme: String,
        destination: Option<String>,
    },
    BundleSeen {
        path: PathBuf,
        scheme: String,
    },
    Retry {
        id: String,
    },
    Dismiss {
        id: String,
    },
    Flag {
        id: String,
    },
    Unflag {
        id: String,
    },
    Remove {
        id: String,
    },
    DismissBugReport,
    AttemptFinished {
        id: String,
        generation: u64,
        outcome: LoopOutcome,
    },
    Shutdown {
        ack: oneshot::Sender<()>,
    },
}

#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::UnboundedSender<CoordinatorMessage>,
    snapshot_rx: watch::Receiver<StoreSnapshot>,
}

impl CoordinatorHandle {
    fn send(&self, message: CoordinatorMessage) -> Result<(), String> {
        self.tx
            .send(message)
            .map_err(|_| "Coordinator is not running".to_string())
    }

    pub fn build_log_seen(&self, scheme: String, destination: Option<String>) -> Result<(), String> {
        self.send(CoordinatorMessage::BuildLogSeen {
            scheme,
            destination,
        })
    }

    pub fn bundle_seen(&self, path: PathBuf, scheme: String) -> Result<(), String> {
        self.send(CoordinatorMessage::BundleSeen { path, scheme })
    }

    pub fn retry(&self, id: &str) -> Result<(), String> {
        self.send(CoordinatorMessage::Retry { id: id.to_string() })
    }

    pub fn dismiss(&self, id: &str) -> Result<(), String> {
        self.send(CoordinatorMessage::Dismiss { id: id.to_string() })
    }

    pub fn flag(&self, id: &str) -> Result<(), String> {
        self.send(CoordinatorMessage::Flag { id: id.to_string() })
    }

    pub fn unflag(&self, id: &str) -> Result<(), String> {
        self.send(CoordinatorMessage::Unflag { id: id.to_string() })
    }

    pub fn remove(&self, id: &str) -> Result<(), String> {
        self.send(CoordinatorMessage::Remove { id: id.to_string() })
    }

    pub fn dismiss_bug_report(&self) -> Result<(), String> {
        self.send(CoordinatorMessage::DismissBugReport)
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StoreSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Stops every retry loop and waits for the coordinator to exit.
    pub async fn shutdown(&self) -> Result<(), String> {
        let (ack, done) = oneshot::channel();
        self.send(CoordinatorMessage::Shutdown { ack })?;
        done.await
            .map_err(|_| "Coordinator exited before acknowledging shutdown".to_string())
    }
}

struct RetryLoop {
    generation: u64,
    cancel_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

struct Persister {
    tx: mpsc::UnboundedSender<Vec<CanonicalCommand>>,
    task: JoinHandle<()>,
}

impl Persister {
    fn spawn(path: PathBuf) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<CanonicalCommand>>();
        let task = tokio::spawn(async move {
            while let Some(mut commands) = rx.recv().await {
                while let Ok(newer) = rx.try_recv() {
                    commands = newer;
                }
                let target = path.clone();
                match tokio::task::spawn_blocking(move || save_commands(&target, &commands)).await {
                    Ok(Ok(())) => debug!(path = %path.display(), "Commands saved"),
                    Ok(Err(err)) => {
                        warn!(error = %err, path = %path.display(), "Failed to save commands")
                    }
                    Err(err) => warn!(error = %err, "Command save task failed"),
                }
            }
        });
        Self { tx, task }
    }

    /// Closes the queue and waits for the last save to land.
    async fn flush(self) {
        drop(self.tx);
        let _ = self.task.await;
    }
}

pub struct Coordinator {
    store: CommandStore,
    persister: Option<Persister>,
    runner: AttemptRunner,
    policy: RetryPolicy,
    loops: HashMap<String, RetryLoop>,
    next_generation: u64,
    tx: mpsc::UnboundedSender<CoordinatorMessage>,
    snapshot_tx: watch::Sender<StoreSnapshot>,
}

impl Coordinator {
    /// Starts the coordinator task. `store_path` of `None` keeps commands in memory only.
    pub fn spawn(
        store: CommandStore,
        store_path: Option<PathBuf>,
        runner: AttemptRunner,
        policy: RetryPolicy,
    ) -> (CoordinatorHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(store.snapshot());

        let coordinator = Coordinator {
            store,
            persister: store_path.map(Persister::spawn),
            runner,
            policy,
            loops: HashMap::new(),
            next_generation: 0,
            tx: tx.clone(),
            snapshot_tx,
        };
        let task = tokio::spawn(coordinator.run(rx));

        (CoordinatorHandle { tx, snapshot_rx }, task)
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<CoordinatorMessage>) {
        while let Some(message) = rx.recv().await {
            if let CoordinatorMessage::Shutdown { ack } = message {
                self.finish().await;
                info!(pending = self.store.pending().len(), "Coordinator stopped");
                let _ = ack.send(());
                return;
            }
            self.handle(message);
        }
        self.finish().await;
    }

    async fn finish(&mut self) {
        self.stop_all_loops();
        if let Some(persister) = self.persister.take() {
            persister.flush().await;
        }
    }

    fn handle(&mut self, message: CoordinatorMessage) {
        match message {
            CoordinatorMessage::BuildLogSeen {
                scheme,
                destination,
            } => self.on_build_log(scheme, destination),
            CoordinatorMessage::BundleSeen { path, scheme } => self.on_bundle(path, scheme),
            CoordinatorMessage::Retry { id } => self.on_retry(&id),
            CoordinatorMessage::Dismiss { id } => {
                self.cancel_loop(&id);
                if self.store.remove_pending(&id) {
                    debug!(pending_id = %id, "Pending extraction dismissed");
                    self.publish();
                }
            }
            CoordinatorMessage::Flag { id } => {
                let changed = self.store.flag(&id);
                self.commit_if(changed, "flag", &id);
            }
            CoordinatorMessage::Unflag { id } => {
                let changed = self.store.unflag(&id);
                self.commit_if(changed, "unflag", &id);
            }
            CoordinatorMessage::Remove { id } => {
                let changed = self.store.remove(&id);
                self.commit_if(changed, "remove", &id);
            }
            CoordinatorMessage::DismissBugReport => {
                self.store.dismiss_bug_report();
                self.publish();
            }
            CoordinatorMessage::AttemptFinished {
                id,
                generation,
                outcome,
            } => self.on_attempt_finished(id, generation, outcome),
            CoordinatorMessage::Shutdown { .. } => {}
        }
    }

    fn on_build_log(&mut self, scheme: String, destination: Option<String>) {
        if self.store.has_pending_for_scheme(&scheme) {
            debug!(scheme = %scheme, "Build log for scheme already pending");
            return;
        }
        let id = self
            .store
            .add_pending(&scheme, destination, None, PendingState::BuildOnly);
        info!(pending_id = %id, scheme = %scheme, "Build log seen; waiting for result bundle");
        self.publish();
    }

    fn on_bundle(&mut self, path: PathBuf, scheme: String) {
        let already_tracked = self
            .store
            .pending()
            .iter()
            .any(|p| p.xcresult_path.as_deref() == Some(path.as_path()));
        if already_tracked {
            debug!(path = %path.display(), "Result bundle already tracked");
            return;
        }

        let build_only = self.store.pending_for_scheme(&scheme).map(|p| p.id.clone());
        let id = match build_only {
            Some(id) => {
                self.store.attach_bundle(&id, path.clone());
                self.store.update_pending_state(&id, PendingState::Waiting);
                id
            }
            None => self.store.add_pending(
                &scheme,
                None,
                Some(path.clone()),
                PendingState::Waiting,
            ),
        };

        info!(pending_id = %id, scheme = %scheme, path = %path.display(), "Result bundle seen");
        self.start_loop(&id, path);
        self.publish();
    }

    fn on_retry(&mut self, id: &str) {
        let bundle = self
            .store
            .pending_by_id(id)
            .and_then(|p| p.xcresult_path.clone());
        let Some(bundle) = bundle else {
            debug!(pending_id = %id, "Nothing to retry without a result bundle");
            return;
        };

        info!(pending_id = %id, "Manual retry");
        self.store.update_pending_state(id, PendingState::Waiting);
        self.start_loop(id, bundle);
        self.publish();
    }

    fn on_attempt_finished(&mut self, id: String, generation: u64, outcome: LoopOutcome) {
        let current = self
            .loops
            .get(&id)
            .is_some_and(|l| l.generation == generation);
        if !current {
            debug!(pending_id = %id, generation, "Discarded outcome of a replaced loop");
            return;
        }
        self.loops.remove(&id);

        if self.store.pending_by_id(&id).is_none() {
            return;
        }

        match outcome {
            LoopOutcome::Resolved(command) => {
                info!(
                    pending_id = %id,
                    command_id = %command.id,
                    scheme = %command.scheme,
                    action = %command.action,
                    "Pending extraction resolved"
                );
                self.store.resolve_pending(&id, command);
                self.persist();
            }
            LoopOutcome::Exhausted { attempts } => {
                warn!(pending_id = %id, attempts, "Extraction retries exhausted");
                self.store.update_pending_state(&id, PendingState::Failed);
            }
            LoopOutcome::Fatal(err) => {
                warn!(pending_id = %id, error = %err, "Extraction failed");
                self.store.update_pending_state(&id, PendingState::Failed);
            }
        }
        self.publish();
    }

    fn start_loop(&mut self, id: &str, bundle: PathBuf) {
        self.cancel_loop(id);
        self.next_generation += 1;
        let generation = self.next_generation;

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let runner = self.runner.clone();
        let policy = self.policy;
        let tx = self.tx.clone();
        let pending_id = id.to_string();

        let task = tokio::spawn(async move {
            if let Some(outcome) = run_retry_loop(&pending_id, bundle, runner, policy, cancel_rx).await
            {
                let _ = tx.send(CoordinatorMessage::AttemptFinished {
                    id: pending_id,
                    generation,
                    outcome,
                });
            }
        });

        self.loops.insert(
            id.to_string(),
            RetryLoop {
                generation,
                cancel_tx,
                task,
            },
        );
    }

    /// Signals a loop to stop. An attempt already in flight runs to completion
    /// and its result is discarded.
    fn cancel_loop(&mut self, id: &str) {
        if let Some(retry_loop) = self.loops.remove(id) {
            let _ = retry_loop.cancel_tx.send(true);
            debug!(pending_id = %id, generation = retry_loop.generation, "Retry loop cancelled");
        }
    }

    fn stop_all_loops(&mut self) {
        for (_, retry_loop) in self.loops.drain() {
            let _ = retry_loop.cancel_tx.send(true);
            retry_loop.task.abort();
        }
    }

    fn commit_if(&mut self, changed: bool, operation: &str, id: &str) {
        if !changed {
            debug!(operation, command_id = %id, "No command with that id");
            return;
        }
        self.persist();
        self.publish();
    }

    fn persist(&self) {
        if let Some(persister) = &self.persister {
            if persister.tx.send(self.store.commands().to_vec()).is_err() {
                warn!("Command writer is gone; change not saved");
            }
        }
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.store.snapshot());
    }
}

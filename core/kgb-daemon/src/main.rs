//! kgb-daemon: watches DerivedData and keeps the known-good command list.
//!
//! A single-writer service. The coordinator task owns the command store and
//! every pending extraction; the watcher, pipeline and stdin control input
//! only send it messages.
//!
//! ## Subcommands
//!
//! - `watch` (default): backfill today's bundles, then watch until Ctrl-C
//! - `list`: print the persisted commands grouped by project
//! - `report`: print the bug report for the first flagged-then-fixed pairing

mod backfill;
mod control;
mod coordinator;
mod logging;
mod pipeline;
mod retry;
mod watcher;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use kgb_core::{
    canonical_root, compose_body, compose_subject, find_bug_report, load_commands, load_config,
    CommandStore, Extractor, GunzipDecompressor, KgbConfig,
};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use coordinator::{Coordinator, CoordinatorHandle};
use retry::{AttemptRunner, RetryPolicy};
use watcher::ArtifactWatcher;

#[derive(Parser)]
#[command(name = "kgb-daemon")]
#[command(about = "Turns Xcode result bundles into replayable xcodebuild commands")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// DerivedData root to watch
    #[arg(long, global = true, value_name = "PATH")]
    root: Option<PathBuf>,

    /// Command list file
    #[arg(long, global = true, value_name = "PATH")]
    store: Option<PathBuf>,

    /// Configuration file (defaults to ~/.kgb/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Clone, Copy)]
enum Commands {
    /// Watch DerivedData and record commands (reads control commands from stdin)
    Watch,

    /// Print recorded commands grouped by project
    List,

    /// Print the bug report for a flagged command that has since passed
    Report,
}

struct Settings {
    root: PathBuf,
    store_path: PathBuf,
    config: KgbConfig,
}

fn main() {
    let _logging_guard = logging::init();
    let cli = Cli::parse();

    let settings = match resolve_settings(&cli) {
        Ok(settings) => settings,
        Err(err) => {
            error!(error = %err, "Failed to resolve kgb-daemon settings");
            std::process::exit(1);
        }
    };

    let result = match cli.command.unwrap_or(Commands::Watch) {
        Commands::Watch => watch(settings),
        Commands::List => list(&settings),
        Commands::Report => report(&settings),
    };

    if let Err(err) = result {
        error!(error = %err, "kgb-daemon failed");
        std::process::exit(1);
    }
}

fn resolve_settings(cli: &Cli) -> Result<Settings, String> {
    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            warn!(error = %err, "Failed to load config; using defaults");
            KgbConfig::default()
        }
    };

    let root = match &cli.root {
        Some(root) => root.clone(),
        None => config.watched_root().map_err(|err| err.to_string())?,
    };
    let store_path = match &cli.store {
        Some(path) => path.clone(),
        None => config.store_path().map_err(|err| err.to_string())?,
    };

    Ok(Settings {
        root,
        store_path,
        config,
    })
}

fn watch(settings: Settings) -> Result<(), String> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| format!("Failed to start async runtime: {}", err))?;
    runtime.block_on(run_watch(settings))
}

async fn run_watch(mut settings: Settings) -> Result<(), String> {
    settings.root = canonical_root(&settings.root).map_err(|err| err.to_string())?;
    let commands = load_commands(&settings.store_path).map_err(|err| err.to_string())?;
    info!(
        commands = commands.len(),
        store = %settings.store_path.display(),
        root = %settings.root.display(),
        "Command list loaded"
    );

    let runner = AttemptRunner::new(settings.root.clone(), Extractor::default());
    let policy = RetryPolicy::from(&settings.config.retry);
    let (handle, coordinator_task) = Coordinator::spawn(
        CommandStore::from_commands(commands),
        Some(settings.store_path.clone()),
        runner,
        policy,
    );

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let pipeline_task =
        pipeline::spawn_pipeline(events_rx, handle.clone(), Arc::new(GunzipDecompressor));

    let mut watcher = ArtifactWatcher::new(settings.root.clone(), settings.config.watcher.latency());
    watcher.start(events_tx.clone()).map_err(|err| {
        format!(
            "Failed to watch {}: {}",
            settings.root.display(),
            err
        )
    })?;

    if settings.config.backfill {
        backfill::run(&settings.root, &events_tx);
    }

    let control_task = control::spawn_stdin_control(handle.clone());
    let notifier_task = spawn_bug_report_notifier(handle.clone());

    tokio::signal::ctrl_c()
        .await
        .map_err(|err| format!("Failed to listen for Ctrl-C: {}", err))?;
    info!("Shutdown requested");

    watcher.stop();
    control_task.abort();
    notifier_task.abort();
    drop(events_tx);
    pipeline_task.abort();

    handle.shutdown().await?;
    let _ = coordinator_task.await;
    Ok(())
}

/// Logs each newly surfaced bug report.
fn spawn_bug_report_notifier(handle: CoordinatorHandle) -> tokio::task::JoinHandle<()> {
    let mut snapshots = handle.subscribe();
    tokio::spawn(async move {
        let mut surfaced = snapshots.borrow().pending_bug_report.clone();
        while snapshots.changed().await.is_ok() {
            let current = snapshots.borrow_and_update().pending_bug_report.clone();
            if let Some(report) = &current {
                if surfaced.as_ref() != Some(report) {
                    info!(
                        broken = %report.broken.id,
                        working = %report.working.id,
                        subject = %compose_subject(report),
                        "Bug report ready; run `kgb-daemon report` for the full text"
                    );
                }
            }
            surfaced = current;
        }
    })
}

fn list(settings: &Settings) -> Result<(), String> {
    let commands = load_commands(&settings.store_path).map_err(|err| err.to_string())?;
    if commands.is_empty() {
        println!("No commands recorded yet.");
        return Ok(());
    }
    let store = CommandStore::from_commands(commands);
    print!("{}", control::render_status(&store.snapshot()));
    Ok(())
}

fn report(settings: &Settings) -> Result<(), String> {
    let commands = load_commands(&settings.store_path).map_err(|err| err.to_string())?;
    match find_bug_report(&commands) {
        Some(report) => {
            println!("{}", compose_subject(&report));
            println!();
            println!("{}", compose_body(&report));
        }
        None => println!("No flagged command has a later working run."),
    }
    Ok(())
}

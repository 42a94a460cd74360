//! Line-oriented control input for `kgb-daemon watch`.
//!
//! Each stdin line is one command:
//!
//! ```text
//! status | retry <id> | dismiss <id> | flag <id> | unflag <id> | remove <id> | dismiss-report
//! ```

use std::path::Path;

use kgb_core::config::tilde_abbreviated;
use kgb_core::StoreSnapshot;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::coordinator::CoordinatorHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    Status,
    Retry(String),
    Dismiss(String),
    Flag(String),
    Unflag(String),
    Remove(String),
    DismissReport,
}

pub fn parse_control_line(line: &str) -> Result<ControlCommand, String> {
    let mut words = line.split_whitespace();
    let verb = words.next().ok_or_else(|| "Empty command".to_string())?;
    let id = words.next().map(str::to_string);
    if words.next().is_some() {
        return Err(format!("Too many arguments for '{}'", verb));
    }

    let with_id = |make: fn(String) -> ControlCommand| {
        id.clone()
            .map(make)
            .ok_or_else(|| format!("'{}' needs an id", verb))
    };

    match verb {
        "status" => Ok(ControlCommand::Status),
        "dismiss-report" => Ok(ControlCommand::DismissReport),
        "retry" => with_id(ControlCommand::Retry),
        "dismiss" => with_id(ControlCommand::Dismiss),
        "flag" => with_id(ControlCommand::Flag),
        "unflag" => with_id(ControlCommand::Unflag),
        "remove" => with_id(ControlCommand::Remove),
        other => Err(format!("Unknown command '{}'", other)),
    }
}

pub fn apply(command: ControlCommand, handle: &CoordinatorHandle) -> Result<(), String> {
    match command {
        ControlCommand::Status => {
            print!("{}", render_status(&handle.snapshot()));
            Ok(())
        }
        ControlCommand::Retry(id) => handle.retry(&id),
        ControlCommand::Dismiss(id) => handle.dismiss(&id),
        ControlCommand::Flag(id) => handle.flag(&id),
        ControlCommand::Unflag(id) => handle.unflag(&id),
        ControlCommand::Remove(id) => handle.remove(&id),
        ControlCommand::DismissReport => handle.dismiss_bug_report(),
    }
}

/// Plain-text view of a snapshot: pending entries, then commands per project.
pub fn render_status(snapshot: &StoreSnapshot) -> String {
    let mut out = String::new();

    for pending in &snapshot.pending {
        out.push_str(&format!(
            "pending {} {} {:?}\n",
            pending.id, pending.scheme, pending.state
        ));
    }

    for group in snapshot.grouped_by_project() {
        out.push_str(&format!("{}\n", group.project_name));
        for command in &group.commands {
            let flag = if command.is_flagged_as_bug { " [bug]" } else { "" };
            let line = command
                .command_string()
                .replace(&command.project_path, &tilde_abbreviated(Path::new(&command.project_path)));
            out.push_str(&format!("  {} {}{}\n", command.id, line, flag));
        }
    }

    if let Some(report) = &snapshot.pending_bug_report {
        out.push_str(&format!(
            "bug report: {} broken, {} works\n",
            report.broken.id, report.working.id
        ));
    }
    out
}

pub fn spawn_stdin_control(handle: CoordinatorHandle) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(err) => {
                    warn!(error = %err, "Failed to read control input");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match parse_control_line(&line).and_then(|command| apply(command, &handle)) {
                Ok(()) => debug!(line = %line.trim(), "Control command applied"),
                Err(err) => warn!(error = %err, "Control command rejected"),
            }
        }
        debug!("Control input closed");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use kgb_core::{
        BuildAction, CanonicalCommand, CommandStore, PendingState, ProjectType,
    };

    #[test]
    fn parses_commands_with_ids() {
        assert_eq!(parse_control_line("status"), Ok(ControlCommand::Status));
        assert_eq!(
            parse_control_line("  retry 01HX  "),
            Ok(ControlCommand::Retry("01HX".to_string()))
        );
        assert_eq!(
            parse_control_line("dismiss-report"),
            Ok(ControlCommand::DismissReport)
        );
        assert_eq!(
            parse_control_line("unflag abc"),
            Ok(ControlCommand::Unflag("abc".to_string()))
        );
    }

    #[test]
    fn rejects_malformed_commands() {
        assert!(parse_control_line("").is_err());
        assert!(parse_control_line("flag").is_err());
        assert!(parse_control_line("remove a b").is_err());
        assert!(parse_control_line("explode now").is_err());
    }

    #[test]
    fn status_lists_pending_and_grouped_commands() {
        let mut store = CommandStore::new();
        store.add(CanonicalCommand {
            id: "c1".to_string(),
            project_path: "/work/PizzaCoach/PizzaCoach.xcworkspace".to_string(),
            project_type: ProjectType::Workspace,
            scheme: "PizzaCoach".to_string(),
            action: BuildAction::Test,
            platform: "iOS Simulator".to_string(),
            device_name: "iPhone 16 Pro".to_string(),
            os_version: "18.2".to_string(),
            timestamp: Utc.with_ymd_and_hms(2026, 2, 21, 14, 24, 35).unwrap(),
            is_flagged_as_bug: false,
        });
        store.add_pending("Widget", None, None, PendingState::BuildOnly);

        let status = render_status(&store.snapshot());
        assert!(status.contains("Widget BuildOnly"));
        assert!(status.contains("PizzaCoach\n"));
        assert!(status.contains("c1 xcodebuild test -workspace /work/PizzaCoach/PizzaCoach.xcworkspace"));
    }
}

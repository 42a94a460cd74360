//! In-memory command store: resolved commands plus in-flight pending entries.
//!
//! # Invariants
//!
//! - At most one non-flagged command per (scheme, action, project name).
//!   Adding a command with an existing key replaces the non-flagged entry in
//!   place, so list position is stable across re-runs.
//! - Flagged commands are never replaced. They stay until unflagged or removed
//!   and anchor the "broken" half of a bug report.
//! - Pending entries are keyed by their own id. Attaching a bundle to a
//!   `BuildOnly` entry mutates that entry; it never copies it.
//!
//! The store is a plain value with no interior locking. The daemon owns it
//! from a single task.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::types::{
    new_id, BugReport, CanonicalCommand, PendingExtraction, PendingState, ProjectGroup,
};

#[derive(Debug, Default, Clone)]
pub struct CommandStore {
    commands: Vec<CanonicalCommand>,
    pending: Vec<PendingExtraction>,
    pending_bug_report: Option<BugReport>,
}

/// Point-in-time copy of the store for readers outside the owning task.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct StoreSnapshot {
    pub commands: Vec<CanonicalCommand>,
    pub pending: Vec<PendingExtraction>,
    pub pending_bug_report: Option<BugReport>,
}

impl StoreSnapshot {
    pub fn grouped_by_project(&self) -> Vec<ProjectGroup> {
        group_by_project(&self.commands)
    }
}

impl CommandStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the store from a persisted list, preserving order.
    pub fn from_commands(commands: Vec<CanonicalCommand>) -> Self {
        Self {
            commands,
            ..Self::default()
        }
    }

    pub fn commands(&self) -> &[CanonicalCommand] {
        &self.commands
    }

    pub fn pending(&self) -> &[PendingExtraction] {
        &self.pending
    }

    pub fn pending_bug_report(&self) -> Option<&BugReport> {
        self.pending_bug_report.as_ref()
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            commands: self.commands.clone(),
            pending: self.pending.clone(),
            pending_bug_report: self.pending_bug_report.clone(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Commands
    // ─────────────────────────────────────────────────────────────────────

    pub fn add(&mut self, command: CanonicalCommand) {
        let existing = self
            .commands
            .iter()
            .position(|c| !c.is_flagged_as_bug && c.same_key(&command));
        match existing {
            Some(idx) => self.commands[idx] = command,
            None => self.commands.push(command),
        }
        self.pending_bug_report = find_bug_report(&self.commands);
    }

    pub fn flag(&mut self, id: &str) -> bool {
        let Some(command) = self.commands.iter_mut().find(|c| c.id == id) else {
            return false;
        };
        command.is_flagged_as_bug = true;
        self.drop_stale_bug_report();
        true
    }

    /// Clears the bug flag. If another non-flagged entry already holds the
    /// same key, the older of the two is dropped.
    pub fn unflag(&mut self, id: &str) -> bool {
        let Some(idx) = self.commands.iter().position(|c| c.id == id) else {
            return false;
        };
        self.commands[idx].is_flagged_as_bug = false;

        let rival = self
            .commands
            .iter()
            .enumerate()
            .position(|(i, c)| i != idx && !c.is_flagged_as_bug && c.same_key(&self.commands[idx]));
        if let Some(rival) = rival {
            let older = if self.commands[rival].timestamp > self.commands[idx].timestamp {
                idx
            } else {
                rival
            };
            self.commands.remove(older);
        }

        self.drop_stale_bug_report();
        true
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.commands.len();
        self.commands.retain(|c| c.id != id);
        let removed = self.commands.len() != before;
        if removed {
            self.drop_stale_bug_report();
        }
        removed
    }

    pub fn dismiss_bug_report(&mut self) {
        self.pending_bug_report = None;
    }

    pub fn grouped_by_project(&self) -> Vec<ProjectGroup> {
        group_by_project(&self.commands)
    }

    fn drop_stale_bug_report(&mut self) {
        let still_valid = self.pending_bug_report.as_ref().is_some_and(|report| {
            let broken = self.commands.iter().find(|c| c.id == report.broken.id);
            let working = self.commands.iter().find(|c| c.id == report.working.id);
            matches!(
                (broken, working),
                (Some(b), Some(w)) if b.is_flagged_as_bug && !w.is_flagged_as_bug
            )
        });
        if !still_valid {
            self.pending_bug_report = None;
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Pending Extractions
    // ─────────────────────────────────────────────────────────────────────

    pub fn add_pending(
        &mut self,
        scheme: &str,
        destination: Option<String>,
        xcresult_path: Option<PathBuf>,
        state: PendingState,
    ) -> String {
        let id = new_id();
        self.pending.push(PendingExtraction {
            id: id.clone(),
            scheme: scheme.to_string(),
            destination,
            xcresult_path,
            state,
        });
        id
    }

    pub fn pending_by_id(&self, id: &str) -> Option<&PendingExtraction> {
        self.pending.iter().find(|p| p.id == id)
    }

    /// Returns the `BuildOnly` entry waiting for a bundle of this scheme.
    pub fn pending_for_scheme(&self, scheme: &str) -> Option<&PendingExtraction> {
        self.pending
            .iter()
            .find(|p| p.state == PendingState::BuildOnly && p.scheme == scheme)
    }

    pub fn has_pending_for_scheme(&self, scheme: &str) -> bool {
        self.pending.iter().any(|p| p.scheme == scheme)
    }

    pub fn update_pending_state(&mut self, id: &str, state: PendingState) -> bool {
        match self.pending.iter_mut().find(|p| p.id == id) {
            Some(pending) => {
                pending.state = state;
                true
            }
            None => false,
        }
    }

    pub fn attach_bundle(&mut self, id: &str, path: PathBuf) -> bool {
        match self.pending.iter_mut().find(|p| p.id == id) {
            Some(pending) => {
                pending.xcresult_path = Some(path);
                true
            }
            None => false,
        }
    }

    /// Replaces a pending entry with its resolved command.
    pub fn resolve_pending(&mut self, id: &str, command: CanonicalCommand) {
        self.pending.retain(|p| p.id != id);
        self.add(command);
    }

    pub fn remove_pending(&mut self, id: &str) -> bool {
        let before = self.pending.len();
        self.pending.retain(|p| p.id != id);
        self.pending.len() != before
    }
}

/// First flagged command paired with the first non-flagged command of the
/// same key that ran strictly later.
pub fn find_bug_report(commands: &[CanonicalCommand]) -> Option<BugReport> {
    commands
        .iter()
        .filter(|c| c.is_flagged_as_bug)
        .find_map(|broken| {
            commands
                .iter()
                .find(|c| !c.is_flagged_as_bug && c.same_key(broken) && c.timestamp > broken.timestamp)
                .map(|working| BugReport {
                    broken: broken.clone(),
                    working: working.clone(),
                })
        })
}

/// Clusters commands by project name, most recently active project first.
pub fn group_by_project(commands: &[CanonicalCommand]) -> Vec<ProjectGroup> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<ProjectGroup> = Vec::new();

    for command in commands {
        let name = command.project_name();
        match index.get(&name) {
            Some(&idx) => groups[idx].commands.push(command.clone()),
            None => {
                index.insert(name.clone(), groups.len());
                groups.push(ProjectGroup {
                    project_name: name,
                    commands: vec![command.clone()],
                });
            }
        }
    }

    groups.sort_by(|a, b| b.latest_timestamp().cmp(&a.latest_timestamp()));
    groups
}

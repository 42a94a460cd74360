//! Bug report text for a (broken, working) command pair.
//!
//! Only composes text; handing it to a mail client is up to the caller.

use std::path::Path;

use crate::types::{BugReport, CanonicalCommand};

const REDACTED: &str = "<redacted>";

/// Replaces the user's home directory with `<parent>/<redacted>`.
pub fn redact_home_path(text: &str, home: &Path) -> String {
    let home_str = home.to_string_lossy();
    let home_str = home_str.trim_end_matches('/');
    if home_str.is_empty() {
        return text.to_string();
    }
    let replacement = match home.parent() {
        Some(parent) if parent != Path::new("/") => format!("{}/{REDACTED}", parent.display()),
        _ => format!("/{REDACTED}"),
    };

    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for (start, matched) in text.match_indices(home_str) {
        let end = start + matched.len();
        if !ends_path_component(&text[end..]) {
            continue;
        }
        out.push_str(&text[last..start]);
        out.push_str(&replacement);
        last = end;
    }
    out.push_str(&text[last..]);
    out
}

/// True when `rest` does not continue the path component just matched, so
/// `/Users/al` is not found inside `/Users/alex`.
fn ends_path_component(rest: &str) -> bool {
    match rest.chars().next() {
        None => true,
        Some(c) => !(c.is_alphanumeric() || matches!(c, '-' | '_' | '.')),
    }
}

pub fn compose_subject(report: &BugReport) -> String {
    format!(
        "KGB Bug: {} {}",
        report.broken.scheme, report.broken.action
    )
}

fn describe(command: &CanonicalCommand) -> String {
    format!(
        "{}\n\nScheme: {}\nAction: {}\nPlatform: {}\nDevice: {}\nOS: {}\nProject: {}",
        command.command_string(),
        command.scheme,
        command.action,
        command.platform,
        command.device_name,
        command.os_version,
        command.project_path
    )
}

/// Renders the report body with `home` redacted.
pub fn compose_body_for_home(report: &BugReport, home: Option<&Path>) -> String {
    let body = format!(
        "KGB Bug Report\n==============\n\n--- BROKEN COMMAND ---\n{}\n\n--- WORKING COMMAND ---\n{}\n",
        describe(&report.broken),
        describe(&report.working)
    );
    match home {
        Some(home) => redact_home_path(&body, home),
        None => body,
    }
}

/// Renders the report body with the current user's home directory redacted.
pub fn compose_body(report: &BugReport) -> String {
    compose_body_for_home(report, dirs::home_dir().as_deref())
}

//! Output formatters for the status and run commands.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use comfy_table::{presets::UTF8_FULL, Table};

use crate::domain::{LockRecord, RunSummary, StatusMap};

use super::triggers::RunOutcome;

/// Formats a table of targets and their recorded status.
///
/// Configured targets come first in configuration order. Ids that only
/// appear in the status map are listed after them.
pub fn format_status_table(configured: &[String], statuses: &StatusMap) -> String {
    if configured.is_empty() && statuses.is_empty() {
        return "No targets configured. Add one with `env-injector set`.".to_string();
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Extension", "Status", "Configured"]);

    for id in configured {
        let status = statuses
            .get(id)
            .map_or_else(|| "-".to_string(), |s| s.to_string());
        table.add_row(vec![id.as_str(), &status, "yes"]);
    }

    for (id, status) in statuses.iter() {
        if configured.iter().any(|c| c == id) {
            continue;
        }
        table.add_row(vec![id, &status.to_string(), "no"]);
    }

    table.to_string()
}

/// One-line description of the lock record.
pub fn format_lock_holder(record: Option<&LockRecord>, now_ms: i64) -> String {
    let Some(record) = record else {
        return "Lock: free".to_string();
    };

    let acquired = DateTime::<Utc>::from_timestamp_millis(record.acquired_at_ms).map_or_else(
        || record.acquired_at_ms.to_string(),
        |dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    );

    format!(
        "Lock: held by {} since {} ({}s ago)",
        record.token,
        acquired,
        record.age_ms(now_ms) / 1000
    )
}

/// Summary line for a finished trigger.
pub fn format_run_outcome(outcome: &RunOutcome) -> String {
    match outcome {
        RunOutcome::LockUnavailable => {
            "Another injection run holds the lock; this run was skipped".to_string()
        }
        RunOutcome::Completed(summary) => format_summary(summary),
    }
}

fn format_summary(summary: &RunSummary) -> String {
    let mut line = format!(
        "Injected: {}  Not found: {}  Unchanged: {}",
        summary.injected.len(),
        summary.not_found.len(),
        summary.unchanged.len()
    );

    if !summary.skipped.is_empty() {
        let _ = write!(line, "  Skipped: {}", summary.skipped.join(", "));
    }
    if !summary.failed.is_empty() {
        let _ = write!(line, "  Failed: {}", summary.failed.join(", "));
    }

    line
}

//! Human-readable output for the CLI.
//!
//! Progress and results are written to stderr one line at a time; the
//! formatting lives here so it can be tested without a terminal.

use crate::executor::{ActionError, ActionReport};
use crate::planner::Action;
use std::fmt::Display;
use std::io::Write;

/// Write `message` and a newline to `stderr`, ignoring write failures.
pub fn write_stderr_line(stderr: &mut dyn Write, message: impl Display) {
    if writeln!(stderr, "{message}").is_err() {
        // Best-effort; there is nowhere else to report to.
    }
}

/// Describe a planned action list.
///
/// # Example
///
/// ```
/// use caskwright_installer::output::plan_text;
///
/// assert_eq!(plan_text(&[]), "Nothing to do.");
/// ```
#[must_use]
pub fn plan_text(actions: &[Action]) -> String {
    if actions.is_empty() {
        return "Nothing to do.".to_owned();
    }
    let mut lines = vec![format!("Planned {} action(s):", actions.len())];
    lines.extend(actions.iter().map(|action| format!("  - {action}")));
    lines.join("\n")
}

/// Describe the result of one action.
///
/// Failures name the identifier, the failing stage and the failure kind,
/// followed by the cause.
#[must_use]
pub fn result_line(result: &Result<ActionReport, ActionError>) -> String {
    match result {
        Ok(report) => {
            let files = report.files.len();
            let noun = if files == 1 { "file" } else { "files" };
            let mut line = format!("ok: {} ({} {files} {noun})", report.action, report.outcome);
            if let Some(warning) = &report.hook_warning {
                line.push_str(&format!("; warning: {warning}"));
            }
            line
        }
        Err(error) => format!("FAILED [{}]: {error}", error.kind()),
    }
}

/// Summarise a batch of results.
#[must_use]
pub fn summary_message(succeeded: usize, failed: usize) -> String {
    let total = succeeded + failed;
    let plural = if total == 1 { "action" } else { "actions" };
    if failed == 0 {
        format!("Completed {total} {plural}.")
    } else {
        format!("Completed {total} {plural}: {succeeded} succeeded, {failed} failed.")
    }
}

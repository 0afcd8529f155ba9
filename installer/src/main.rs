//! caskwright CLI entrypoint.
//!
//! Installs, upgrades and removes manifest-described resource bundles. Every
//! action is reported on stderr; the process exits with status 1 when any
//! action or the command itself failed.

use caskwright_installer::cli::Cli;
use caskwright_installer::commands::run;
use caskwright_installer::dirs::SystemBaseDirs;
use caskwright_installer::error::{InstallerError, Result};
use caskwright_installer::output::write_stderr_line;
use clap::Parser;
use std::io::Write;

fn main() {
    let cli = Cli::parse();
    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();
    let run_result = run(&cli, &SystemBaseDirs, &mut stdout, &mut stderr);
    let exit_code = exit_code_for_run_result(run_result, &mut stderr);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

fn exit_code_for_run_result(result: Result<()>, stderr: &mut dyn Write) -> i32 {
    match result {
        Ok(()) => 0,
        // Each failed action has already been reported with its own line.
        Err(InstallerError::ActionsFailed { .. }) => 1,
        Err(err) => {
            write_stderr_line(stderr, format!("error: {err}"));
            let mut source = std::error::Error::source(&err);
            while let Some(cause) = source {
                write_stderr_line(stderr, format!("  caused by: {cause}"));
                source = cause.source();
            }
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caskwright_installer::state::StateError;
    use camino::Utf8PathBuf;

    #[test]
    fn exit_code_for_run_result_returns_zero_on_success() {
        let mut stderr = Vec::new();
        let exit_code = exit_code_for_run_result(Ok(()), &mut stderr);
        assert_eq!(exit_code, 0);
        assert!(stderr.is_empty());
    }

    #[test]
    fn failed_actions_exit_one_without_repeating_themselves() {
        let mut stderr = Vec::new();
        let err = InstallerError::ActionsFailed {
            failed: 1,
            total: 3,
        };

        let exit_code = exit_code_for_run_result(Err(err), &mut stderr);

        assert_eq!(exit_code, 1);
        assert!(stderr.is_empty());
    }

    #[test]
    fn other_errors_print_their_cause_chain() {
        let err = InstallerError::State(StateError::CreateDirectory {
            path: Utf8PathBuf::from("/readonly/state"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        });

        let mut stderr = Vec::new();
        let exit_code = exit_code_for_run_result(Err(err), &mut stderr);
        assert_eq!(exit_code, 1);

        let stderr_text = String::from_utf8(stderr).expect("stderr was not UTF-8");
        assert!(stderr_text.starts_with("error: "));
        assert!(stderr_text.contains("/readonly/state"));
        assert!(stderr_text.contains("caused by: denied"));
    }
}

//! Subcommand implementations.
//!
//! Each command resolves configuration, snapshots installed state, plans,
//! and (for `install` and `remove`) runs the plan. Results go to `stderr`;
//! `plan` and `list` write their listings to `stdout`.

use crate::artifact::extract::StandardExpander;
use crate::artifact::fetch::HttpFetcher;
use crate::cli::{Cli, Command, ListArgs};
use crate::config::{InstallerConfig, ResolvedConfig};
use crate::dirs::BaseDirs;
use crate::error::{InstallerError, Result};
use crate::executor::{ActionError, ActionReport, Collaborators, Executor};
use crate::hooks::platform_hook;
use crate::list_output::{format_human, format_json};
use crate::manifest::{ManifestId, ManifestSet, load_manifest};
use crate::output::{plan_text, result_line, summary_message, write_stderr_line};
use crate::planner::{Action, Request, plan_all};
use crate::scheduler::run_actions;
use crate::state::{RecordStore, StateStore};
use camino::Utf8PathBuf;
use log::debug;
use std::io::Write;

/// Run the parsed command line.
///
/// # Errors
///
/// Returns an error when configuration, manifests or state cannot be
/// loaded, or [`InstallerError::ActionsFailed`] after reporting every
/// action when at least one of them failed.
pub fn run(
    cli: &Cli,
    dirs: &dyn BaseDirs,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> Result<()> {
    let config = resolve_config(cli, dirs)?;
    match &cli.command {
        Command::Plan(args) => {
            let actions = plan_requests(&config, &manifest_requests(&args.manifests)?)?;
            write_stdout(stdout, &plan_text(&actions))
        }
        Command::Install(args) => {
            let actions = plan_requests(&config, &manifest_requests(&args.manifests)?)?;
            apply(&config, &actions, cli.quiet, stderr)
        }
        Command::Remove(args) => {
            let actions = plan_requests(&config, &removal_requests(&args.ids)?)?;
            apply(&config, &actions, cli.quiet, stderr)
        }
        Command::List(args) => list(&config, args, stdout),
    }
}

/// Load the configuration file and apply command-line overrides.
///
/// # Errors
///
/// Returns [`InstallerError::Config`] when the file is unreadable or a
/// directory cannot be determined.
pub fn resolve_config(cli: &Cli, dirs: &dyn BaseDirs) -> Result<ResolvedConfig> {
    let mut config = match &cli.config {
        Some(path) => InstallerConfig::load_from(path)?,
        None => InstallerConfig::load_default(dirs)?,
    };
    if let Some(target_dir) = &cli.target_dir {
        config.target_dir = Some(target_dir.clone());
    }
    if let Some(state_dir) = &cli.state_dir {
        config.state_dir = Some(state_dir.clone());
    }
    if let Some(jobs) = cli.jobs {
        config.jobs = Some(jobs);
    }
    Ok(config.resolve(dirs)?)
}

/// Load manifest files into install requests.
///
/// # Errors
///
/// Returns [`InstallerError::ManifestLoad`] for an unreadable manifest and
/// [`InstallerError::Manifest`] when two manifests share an identifier.
pub fn manifest_requests(paths: &[Utf8PathBuf]) -> Result<Vec<Request>> {
    let mut set = ManifestSet::new();
    for path in paths {
        let manifest =
            load_manifest(path.as_std_path()).map_err(|source| InstallerError::ManifestLoad {
                path: path.clone(),
                source: Box::new(source),
            })?;
        set.insert(manifest)?;
    }
    Ok(set.iter().cloned().map(Request::Install).collect())
}

fn removal_requests(ids: &[String]) -> Result<Vec<Request>> {
    ids.iter()
        .map(|id| -> Result<Request> { Ok(Request::Remove(ManifestId::try_from(id.as_str())?)) })
        .collect()
}

fn plan_requests(config: &ResolvedConfig, requests: &[Request]) -> Result<Vec<Action>> {
    let store = StateStore::open(&config.state_dir)?;
    let records = store.records()?;
    Ok(plan_all(requests, &records)?)
}

/// Run `actions` with the production collaborators and report each result.
///
/// The staging lock is held for the whole run, and stale staging entries
/// from an interrupted run are discarded first.
///
/// # Errors
///
/// Returns [`InstallerError::ActionsFailed`] when any action failed.
pub fn apply(
    config: &ResolvedConfig,
    actions: &[Action],
    quiet: bool,
    stderr: &mut dyn Write,
) -> Result<()> {
    if actions.is_empty() {
        if !quiet {
            write_stderr_line(stderr, "Nothing to do.");
        }
        return Ok(());
    }

    let staging = config.staging();
    let staging_error = |source: std::io::Error| InstallerError::Staging {
        path: staging.root().to_owned(),
        source,
    };
    let _lock = staging.lock().map_err(staging_error)?;
    let discarded = staging
        .discard_stale()
        .map_err(staging_error)?;
    if discarded > 0 {
        debug!("discarded {discarded} stale staging entries");
    }

    let fetcher = HttpFetcher::new(config.fetch_timeout);
    let store = StateStore::open(&config.state_dir)?;
    let hook = platform_hook(&config.layout, config.refresh_font_cache);
    let collaborators = Collaborators {
        fetcher: &fetcher,
        expander: &StandardExpander,
        store: &store,
        hook: &*hook,
    };
    let executor =
        Executor::new(collaborators, staging, config.layout.clone()).with_retry(config.retry);

    if !quiet {
        write_stderr_line(stderr, plan_text(actions));
    }
    let results = run_actions(&executor, actions, config.jobs)?;
    report(&results, quiet, stderr)
}

/// Write one line per result and a summary.
///
/// Failures are always written; successes only when not `quiet`.
///
/// # Errors
///
/// Returns [`InstallerError::ActionsFailed`] when any result is an error.
pub fn report(
    results: &[std::result::Result<ActionReport, ActionError>],
    quiet: bool,
    stderr: &mut dyn Write,
) -> Result<()> {
    let failed = results.iter().filter(|result| result.is_err()).count();
    for result in results {
        if result.is_err() || !quiet {
            write_stderr_line(stderr, result_line(result));
        }
    }
    if !quiet || failed > 0 {
        write_stderr_line(stderr, summary_message(results.len() - failed, failed));
    }
    if failed > 0 {
        return Err(InstallerError::ActionsFailed {
            failed,
            total: results.len(),
        });
    }
    Ok(())
}

fn list(config: &ResolvedConfig, args: &ListArgs, stdout: &mut dyn Write) -> Result<()> {
    let store = StateStore::open(&config.state_dir)?;
    let records = store.list()?;
    let text = if args.json {
        format_json(&records)
    } else {
        format_human(&records)
    };
    write_stdout(stdout, &text)
}

fn write_stdout(stdout: &mut dyn Write, text: &str) -> Result<()> {
    writeln!(stdout, "{text}").map_err(|source| InstallerError::WriteFailed { source })
}

#[cfg(test)]
#[path = "commands_tests.rs"]
mod tests;

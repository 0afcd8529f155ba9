//! CLI argument definitions for caskwright.
//!
//! This module defines the command-line interface using clap. It is separated
//! from the entrypoint so argument parsing can be tested on its own.

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

/// Install, upgrade and remove manifest-described resource bundles.
#[derive(Parser, Debug)]
#[command(name = "caskwright")]
#[command(version, about)]
#[command(long_about = concat!(
    "Install, upgrade and remove manifest-described resource bundles.\n\n",
    "A manifest names a versioned artifact, its SHA-256 digest and the files ",
    "inside it to install. caskwright downloads the artifact, verifies it, ",
    "expands it and places the declared files, recording what it installed ",
    "so later runs can upgrade or remove them.",
))]
#[command(after_help = concat!(
    "EXAMPLES:\n",
    "  Show what installing a manifest would change:\n",
    "    $ caskwright plan manifests/font-latin-modern.toml\n\n",
    "  Install or upgrade:\n",
    "    $ caskwright install manifests/font-latin-modern.toml\n\n",
    "  Remove by identifier:\n",
    "    $ caskwright remove font-latin-modern\n\n",
    "  List installed packages as JSON:\n",
    "    $ caskwright list --json",
))]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Read settings from this file instead of the default location.
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<Utf8PathBuf>,

    /// Install fonts into this directory [default: platform font directory].
    #[arg(short, long, global = true, value_name = "DIR")]
    pub target_dir: Option<Utf8PathBuf>,

    /// Keep installed-state records in this directory.
    #[arg(long, global = true, value_name = "DIR")]
    pub state_dir: Option<Utf8PathBuf>,

    /// Number of actions to run in parallel.
    #[arg(short, long, global = true, value_name = "N")]
    pub jobs: Option<usize>,

    /// Suppress progress output (failures are still shown).
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Show the actions needed to converge the given manifests.
    Plan(ManifestArgs),

    /// Install or upgrade the given manifests.
    Install(ManifestArgs),

    /// Remove installed packages by identifier.
    Remove(RemoveArgs),

    /// List installed packages.
    List(ListArgs),
}

/// Manifest files to act on.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
pub struct ManifestArgs {
    /// Manifest files (`.toml` or `.json`).
    #[arg(required = true, value_name = "MANIFEST")]
    pub manifests: Vec<Utf8PathBuf>,
}

/// Identifiers to remove.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
pub struct RemoveArgs {
    /// Identifiers of installed packages.
    #[arg(required = true, value_name = "ID")]
    pub ids: Vec<String>,
}

/// Arguments for the list command.
#[derive(Parser, Debug, Clone, Default, PartialEq, Eq)]
pub struct ListArgs {
    /// Output in JSON format for scripting.
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;

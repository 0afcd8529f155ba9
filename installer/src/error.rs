//! Error types for the caskwright CLI.
//!
//! Library modules each have their own error enum; this module rolls them up
//! into the single type the command layer returns. Failed actions are not
//! errors here: they are reported one by one and then summarised as
//! [`InstallerError::ActionsFailed`].

use crate::config::ConfigError;
use crate::manifest::parser::ManifestParseError;
use crate::manifest::ManifestError;
use crate::planner::PlanError;
use crate::scheduler::SchedulerError;
use crate::state::StateError;
use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors that stop a command before or after its actions run.
#[derive(Debug, Error)]
pub enum InstallerError {
    /// Configuration could not be loaded or resolved.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A manifest file could not be loaded.
    #[error("cannot load manifest {path}: {source}")]
    ManifestLoad {
        /// Manifest file given on the command line.
        path: Utf8PathBuf,
        /// Why loading failed.
        #[source]
        source: Box<ManifestParseError>,
    },

    /// Manifests or identifiers given on the command line are invalid
    /// (for example, two manifests share an identifier).
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// The requested changes could not be planned.
    #[error(transparent)]
    Plan(#[from] PlanError),

    /// Installed state could not be read.
    #[error(transparent)]
    State(#[from] StateError),

    /// The worker pool could not be started.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    /// The staging area could not be cleaned.
    #[error("cannot clean staging area {path}")]
    Staging {
        /// Staging root.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to write output.
    #[error("failed to write output")]
    WriteFailed {
        /// The underlying error that caused the write to fail.
        #[source]
        source: std::io::Error,
    },

    /// One or more actions failed; each was already reported.
    #[error("{failed} of {total} action(s) failed")]
    ActionsFailed {
        /// Number of failed actions.
        failed: usize,
        /// Number of actions attempted.
        total: usize,
    },
}

/// Result type for CLI commands.
pub type Result<T> = std::result::Result<T, InstallerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_failed_counts_both_sides() {
        let err = InstallerError::ActionsFailed {
            failed: 2,
            total: 5,
        };
        assert_eq!(err.to_string(), "2 of 5 action(s) failed");
    }

    #[test]
    fn manifest_load_names_the_file() {
        let err = InstallerError::ManifestLoad {
            path: Utf8PathBuf::from("fonts/missing.toml"),
            source: Box::new(ManifestParseError::UnsupportedFormat {
                path: "fonts/missing.yaml".into(),
            }),
        };
        let message = err.to_string();
        assert!(message.starts_with("cannot load manifest fonts/missing.toml"));
        assert!(message.contains("expected .json or .toml"));
    }

    #[test]
    fn duplicate_manifests_are_transparent() {
        let err = InstallerError::from(ManifestError::DuplicateManifest {
            id: "font-a".to_owned(),
        });
        assert!(err.to_string().contains("font-a"));
    }
}

//! caskwright installer library.
//!
//! This crate interprets package manifests and converges a target
//! environment to them: it downloads declared artifacts, verifies their
//! SHA-256 digests, expands archives, places the declared resources and
//! records what was installed so later runs can upgrade or remove it. It is
//! used by the `caskwright` CLI binary and can be driven programmatically.
//!
//! # Modules
//!
//! - [`artifact`] - Fetching, staging, verification and expansion of artifacts
//! - [`atomic`] - Write-to-temporary-then-rename file replacement
//! - [`cli`] - Command-line argument definitions
//! - [`commands`] - Subcommand implementations
//! - [`config`] - Configuration loading and resolution
//! - [`dirs`] - Directory resolution abstraction for platform-specific paths
//! - [`error`] - Top-level error type for the CLI
//! - [`executor`] - Transactional application of planned actions
//! - [`hooks`] - Post-change platform hooks such as font cache refreshes
//! - [`list_output`] - Output formatting for installed-package listing
//! - [`manifest`] - Validated manifest data model and parsers
//! - [`output`] - Human-readable progress and result lines
//! - [`planner`] - Convergence planning against installed state
//! - [`scheduler`] - Per-identifier locking and parallel action execution
//! - [`state`] - Crash-consistent installed-state records
//! - [`target`] - Install locations and the placement journal

pub mod artifact;
pub mod atomic;
pub mod cli;
pub mod commands;
pub mod config;
pub mod dirs;
pub mod error;
pub mod executor;
pub mod hooks;
pub mod list_output;
pub mod manifest;
pub mod output;
pub mod planner;
pub mod scheduler;
pub mod state;
pub mod target;

#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;

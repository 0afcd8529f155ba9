//! Artifact acquisition: download, integrity verification, and expansion.
//!
//! These stages turn an [`ArtifactSpec`](crate::manifest::ArtifactSpec) into
//! a map of extracted member files that the executor can install.
//!
//! # Sub-modules
//!
//! - [`fetch`]: `ArtifactFetcher` trait and the `ureq`-backed implementation.
//! - [`staging`]: Staging directory layout and restart clean-up.
//! - [`verify`]: SHA-256 computation and comparison.
//! - [`extract`]: Archive expansion with path traversal protection.
//! - [`members`]: Member-name to extracted-path mapping and resource lookup.

pub mod extract;
pub mod fetch;
pub mod members;
pub mod staging;
pub mod verify;

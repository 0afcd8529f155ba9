//! Shared fixtures for the installer integration suites.

use caskwright_installer::artifact::extract::StandardExpander;
use caskwright_installer::executor::{Collaborators, Executor, RetryPolicy};
use caskwright_installer::test_utils::{FlakyStore, RecordingHook, Sandbox, StaticFetcher};
use std::path::PathBuf;
use std::time::Duration;

/// Font files declared by the Latin Modern 2.004 bundle.
pub const LATIN_MODERN_FONTS: [&str; 72] = [
    "lmmono10-italic.otf",
    "lmmono10-regular.otf",
    "lmmono12-regular.otf",
    "lmmono8-regular.otf",
    "lmmono9-regular.otf",
    "lmmonocaps10-oblique.otf",
    "lmmonocaps10-regular.otf",
    "lmmonolt10-bold.otf",
    "lmmonolt10-boldoblique.otf",
    "lmmonolt10-oblique.otf",
    "lmmonolt10-regular.otf",
    "lmmonoltcond10-oblique.otf",
    "lmmonoltcond10-regular.otf",
    "lmmonoprop10-oblique.otf",
    "lmmonoprop10-regular.otf",
    "lmmonoproplt10-bold.otf",
    "lmmonoproplt10-boldoblique.otf",
    "lmmonoproplt10-oblique.otf",
    "lmmonoproplt10-regular.otf",
    "lmmonoslant10-regular.otf",
    "lmroman10-bold.otf",
    "lmroman10-bolditalic.otf",
    "lmroman10-italic.otf",
    "lmroman10-regular.otf",
    "lmroman12-bold.otf",
    "lmroman12-italic.otf",
    "lmroman12-regular.otf",
    "lmroman17-regular.otf",
    "lmroman5-bold.otf",
    "lmroman5-regular.otf",
    "lmroman6-bold.otf",
    "lmroman6-regular.otf",
    "lmroman7-bold.otf",
    "lmroman7-italic.otf",
    "lmroman7-regular.otf",
    "lmroman8-bold.otf",
    "lmroman8-italic.otf",
    "lmroman8-regular.otf",
    "lmroman9-bold.otf",
    "lmroman9-italic.otf",
    "lmroman9-regular.otf",
    "lmromancaps10-oblique.otf",
    "lmromancaps10-regular.otf",
    "lmromandemi10-oblique.otf",
    "lmromandemi10-regular.otf",
    "lmromandunh10-oblique.otf",
    "lmromandunh10-regular.otf",
    "lmromanslant10-bold.otf",
    "lmromanslant10-regular.otf",
    "lmromanslant12-regular.otf",
    "lmromanslant17-regular.otf",
    "lmromanslant8-regular.otf",
    "lmromanslant9-regular.otf",
    "lmromanunsl10-regular.otf",
    "lmsans10-bold.otf",
    "lmsans10-boldoblique.otf",
    "lmsans10-oblique.otf",
    "lmsans10-regular.otf",
    "lmsans12-oblique.otf",
    "lmsans12-regular.otf",
    "lmsans17-oblique.otf",
    "lmsans17-regular.otf",
    "lmsans8-oblique.otf",
    "lmsans8-regular.otf",
    "lmsans9-oblique.otf",
    "lmsans9-regular.otf",
    "lmsansdemicond10-oblique.otf",
    "lmsansdemicond10-regular.otf",
    "lmsansquot8-bold.otf",
    "lmsansquot8-boldoblique.otf",
    "lmsansquot8-oblique.otf",
    "lmsansquot8-regular.otf",
];

/// Returns the workspace root directory (parent of the installer crate).
pub fn workspace_root() -> PathBuf {
    PathBuf::from(std::env!("CARGO_MANIFEST_DIR"))
        .parent()
        .expect("manifest dir should have parent")
        .to_owned()
}

/// Identifier of the Latin Modern bundle.
pub const LATIN_MODERN_ID: &str = "font-latin-modern";

/// A sandbox with in-memory collaborators around a real state store.
pub struct Rig {
    pub sandbox: Sandbox,
    pub fetcher: StaticFetcher,
    pub store: FlakyStore,
    pub hook: RecordingHook,
}

impl Rig {
    pub fn new() -> Self {
        let sandbox = Sandbox::new();
        let store = FlakyStore::new(sandbox.store());
        Self {
            sandbox,
            fetcher: StaticFetcher::new(),
            store,
            hook: RecordingHook::new(),
        }
    }

    /// Builds an executor over the rig's collaborators with a fast retry
    /// schedule.
    pub fn executor(&self) -> Executor<'_> {
        let collaborators = Collaborators {
            fetcher: &self.fetcher,
            expander: &StandardExpander,
            store: &self.store,
            hook: &self.hook,
        };
        Executor::new(
            collaborators,
            self.sandbox.staging.clone(),
            self.sandbox.layout.clone(),
        )
        .with_retry(RetryPolicy {
            attempts: 2,
            backoff: Duration::ZERO,
        })
    }
}

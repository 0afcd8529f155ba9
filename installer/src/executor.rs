//! Transactional application of planned actions.
//!
//! An install or upgrade stages, verifies and expands every artifact and
//! resolves every declared resource before the target directories are
//! touched. Target changes are journalled in a [`Placement`] and undone if
//! placing files or writing the record fails, so the previous record (and
//! the files it lists) survive any failed upgrade.

use crate::artifact::extract::{ArchiveExpander, ExtractionError};
use crate::artifact::fetch::{ArtifactFetcher, FetchError};
use crate::artifact::members::{MemberMap, ResolveError};
use crate::artifact::staging::StagingArea;
use crate::artifact::verify::{VerifyError, verify};
use crate::hooks::PostInstallHook;
use crate::manifest::{ArtifactSpec, Manifest, ManifestError, ManifestId, Sha256Digest};
use crate::planner::Action;
use crate::scheduler::IdentifierLocks;
use crate::state::{InstalledAt, InstalledRecord, RecordStore, StateError};
use crate::target::{Placement, TargetError, TargetLayout, remove_installed};
use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io;
use std::time::Duration;
use tempfile::TempDir;

/// Step of an action at which a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Downloading an artifact.
    Fetch,
    /// Checking an artifact's digest.
    Verify,
    /// Expanding an artifact.
    Expand,
    /// Locating declared resources among expanded members.
    Resolve,
    /// Changing files in the target directories.
    Place,
    /// Reading or writing the installed-state record.
    Record,
    /// Deleting installed files.
    Remove,
}

impl Stage {
    /// Return the stage name used in reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Verify => "verify",
            Self::Expand => "expand",
            Self::Resolve => "resolve",
            Self::Place => "place",
            Self::Record => "record",
            Self::Remove => "remove",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Underlying cause of a failed action.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// The manifest could not be applied (for example, a URL failed to
    /// expand).
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// Downloading failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Hashing the staged artifact failed.
    #[error(transparent)]
    Verify(#[from] VerifyError),

    /// The staged artifact does not hash to the declared digest.
    #[error("digest mismatch for {url}: expected {expected}, got {actual}")]
    DigestMismatch {
        /// Artifact URL.
        url: String,
        /// Digest declared by the manifest.
        expected: Sha256Digest,
        /// Digest of the downloaded bytes.
        actual: Sha256Digest,
    },

    /// Expansion failed.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    /// A declared resource is absent or ambiguous.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Changing the target directories failed.
    #[error(transparent)]
    Target(#[from] TargetError),

    /// Reading or writing state failed.
    #[error(transparent)]
    State(#[from] StateError),

    /// Preparing the staging area failed.
    #[error("staging error at {path}: {source}")]
    Staging {
        /// The staging path involved.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// Coarse classification of failures, for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Transport failure while downloading.
    Network,
    /// The server answered with a non-success status.
    HttpStatus,
    /// The artifact does not match its declared digest.
    DigestMismatch,
    /// An archive member would escape the expansion root.
    ArchiveTraversal,
    /// A declared resource is not in the artifact.
    MissingResource,
    /// The artifact is not a readable archive of its declared kind.
    InvalidArchive,
    /// State could not be read or written.
    Persistence,
    /// A destination is occupied by a file this manifest does not own.
    Conflict,
    /// The manifest cannot be applied as written.
    InvalidManifest,
    /// Any other filesystem failure.
    Io,
}

impl FailureKind {
    /// Return the kind's report name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Network => "NetworkError",
            Self::HttpStatus => "HttpStatusError",
            Self::DigestMismatch => "DigestMismatchError",
            Self::ArchiveTraversal => "ArchiveTraversalError",
            Self::MissingResource => "MissingResourceError",
            Self::InvalidArchive => "InvalidArchiveError",
            Self::Persistence => "PersistenceError",
            Self::Conflict => "ConflictError",
            Self::InvalidManifest => "InvalidManifestError",
            Self::Io => "IoError",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl StageError {
    /// Classify the failure.
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Manifest(_) | Self::Fetch(FetchError::InvalidUrl { .. }) => {
                FailureKind::InvalidManifest
            }
            Self::Fetch(FetchError::Network { .. }) => FailureKind::Network,
            Self::Fetch(FetchError::HttpStatus { .. }) => FailureKind::HttpStatus,
            Self::DigestMismatch { .. } => FailureKind::DigestMismatch,
            Self::Extraction(ExtractionError::PathTraversal { .. }) => {
                FailureKind::ArchiveTraversal
            }
            Self::Extraction(ExtractionError::EmptyArchive) | Self::Resolve(_) => {
                FailureKind::MissingResource
            }
            Self::Extraction(ExtractionError::Zip(_) | ExtractionError::NonUtf8Name { .. }) => {
                FailureKind::InvalidArchive
            }
            Self::State(_) => FailureKind::Persistence,
            Self::Target(TargetError::Conflict { .. }) => FailureKind::Conflict,
            Self::Fetch(FetchError::Io(_))
            | Self::Verify(_)
            | Self::Extraction(ExtractionError::Io(_))
            | Self::Target(TargetError::Io { .. })
            | Self::Staging { .. } => FailureKind::Io,
        }
    }
}

/// A failed action, naming the identifier, stage and cause.
#[derive(Debug, thiserror::Error)]
#[error("{stage} failed for {id}: {source}")]
pub struct ActionError {
    /// Identifier the action concerned.
    pub id: ManifestId,
    /// Stage that failed.
    pub stage: Stage,
    /// Underlying cause.
    #[source]
    pub source: StageError,
}

impl ActionError {
    fn new(id: &ManifestId, stage: Stage, source: impl Into<StageError>) -> Self {
        Self {
            id: id.clone(),
            stage,
            source: source.into(),
        }
    }

    /// Classify the failure.
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        self.source.kind()
    }
}

/// What a successful action did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A fresh install was recorded.
    Installed,
    /// An existing record was replaced.
    Upgraded,
    /// A record was deleted (or was already absent).
    Removed,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Installed => "installed",
            Self::Upgraded => "upgraded",
            Self::Removed => "removed",
        })
    }
}

/// Result of a successful action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionReport {
    /// The action that ran.
    pub action: Action,
    /// What it did.
    pub outcome: Outcome,
    /// Files installed, or removed for a removal.
    pub files: Vec<Utf8PathBuf>,
    /// Post-change hook failure, if any. The action itself still succeeded.
    pub hook_warning: Option<String>,
}

/// Bounded retry schedule for state writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub attempts: u32,
    /// Delay before the second attempt; later attempts wait proportionally
    /// longer.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(50),
        }
    }
}

impl RetryPolicy {
    /// Run `op` until it succeeds or the attempts are exhausted, returning
    /// the last error.
    ///
    /// # Errors
    ///
    /// Returns the error from the final attempt.
    pub fn run<T, E: fmt::Display>(
        &self,
        what: &str,
        mut op: impl FnMut() -> Result<T, E>,
    ) -> Result<T, E> {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if attempt < attempts => {
                    warn!("{what} failed (attempt {attempt} of {attempts}): {err}");
                    std::thread::sleep(self.backoff.saturating_mul(attempt));
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Trait objects the executor delegates to.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    /// Downloads artifacts.
    pub fetcher: &'a dyn ArtifactFetcher,
    /// Expands staged artifacts.
    pub expander: &'a dyn ArchiveExpander,
    /// Persists installed-state records.
    pub store: &'a dyn RecordStore,
    /// Notified after target directories change.
    pub hook: &'a dyn PostInstallHook,
}

/// Applies actions one at a time per identifier.
pub struct Executor<'a> {
    collaborators: Collaborators<'a>,
    staging: StagingArea,
    layout: TargetLayout,
    retry: RetryPolicy,
    locks: IdentifierLocks,
}

/// Declared resources matched to extracted files, with the expansion
/// directories that hold them.
struct Resolved {
    files: Vec<(Utf8PathBuf, Utf8PathBuf)>,
    _expansions: Vec<TempDir>,
}

impl<'a> Executor<'a> {
    /// Create an executor with the default retry policy.
    #[must_use]
    pub fn new(collaborators: Collaborators<'a>, staging: StagingArea, layout: TargetLayout) -> Self {
        Self {
            collaborators,
            staging,
            layout,
            retry: RetryPolicy::default(),
            locks: IdentifierLocks::new(),
        }
    }

    /// Replace the retry policy for state writes.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Return the target layout.
    #[must_use]
    pub fn layout(&self) -> &TargetLayout {
        &self.layout
    }

    /// Apply one action. Concurrent calls for the same identifier run one
    /// after another.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError`] naming the failing stage. A failed install or
    /// upgrade leaves the target directories and the previous record as
    /// they were.
    pub fn execute(&self, action: &Action) -> Result<ActionReport, ActionError> {
        let _guard = self.locks.lock(action.id());
        info!("{action}");
        let result = match action {
            Action::Install { manifest, .. } | Action::Upgrade { manifest, .. } => {
                self.converge(action, manifest)
            }
            Action::Remove { id, .. } => self.remove(action, id),
        };
        if let Err(err) = &result {
            warn!("{action} failed: {err}");
        }
        result
    }

    fn converge(&self, action: &Action, manifest: &Manifest) -> Result<ActionReport, ActionError> {
        let id = manifest.id();
        let resolved = self.prepare(manifest)?;

        let previous = self
            .collaborators
            .store
            .get(id)
            .map_err(|err| ActionError::new(id, Stage::Record, err))?;

        let foreign = if previous.is_some() {
            self.foreign_files(id)?
        } else {
            BTreeMap::new()
        };

        let mut placement = Placement::new();
        if let Err(err) = self.place_all(&mut placement, previous.as_ref(), &foreign, &resolved) {
            placement.rollback();
            return Err(ActionError::new(id, Stage::Place, err));
        }

        let record = InstalledRecord {
            id: id.clone(),
            version: manifest.version().clone(),
            files: placement.placed(),
            installed_at: InstalledAt::now(),
        };
        let written = self
            .retry
            .run(&format!("recording {id}"), || self.collaborators.store.put(&record));
        if let Err(err) = written {
            placement.rollback();
            return Err(ActionError::new(id, Stage::Record, err));
        }
        placement.commit();
        drop(resolved);

        let mut changed = record.files.clone();
        if let Some(previous) = previous {
            changed.extend(previous.files);
        }
        let outcome = match action {
            Action::Upgrade { .. } => Outcome::Upgraded,
            _ => Outcome::Installed,
        };
        Ok(ActionReport {
            action: action.clone(),
            outcome,
            files: record.files,
            hook_warning: self.run_hook(&changed),
        })
    }

    /// Stage, verify and expand every artifact, then resolve every
    /// resource. Nothing outside the staging area is touched.
    fn prepare(&self, manifest: &Manifest) -> Result<Resolved, ActionError> {
        let id = manifest.id();
        let mut members = MemberMap::new();
        let mut expansions = Vec::new();
        for spec in manifest.artifacts() {
            let url = spec
                .url_for(manifest.version())
                .map_err(|err| ActionError::new(id, Stage::Fetch, err))?;
            let staged = self.stage_artifact(id, &url, spec)?;
            let key = StagingArea::cache_key(&url, &spec.sha256);
            let dir = self
                .staging
                .expansion_dir(&key)
                .map_err(|err| ActionError::new(id, Stage::Expand, staging_error(&key, err)))?;
            let dir_path = utf8(dir.path()).map_err(|err| ActionError::new(id, Stage::Expand, err))?;
            let expanded = self
                .collaborators
                .expander
                .expand(&staged, spec.archive_kind(), &dir_path)
                .map_err(|err| ActionError::new(id, Stage::Expand, err))?;
            members.merge(expanded);
            expansions.push(dir);
        }

        let mut files = Vec::with_capacity(manifest.resources().len());
        for resource in manifest.resources() {
            let source = members
                .resolve(resource.file())
                .map_err(|err| ActionError::new(id, Stage::Resolve, err))?;
            files.push((source.to_path_buf(), self.layout.destination(resource)));
        }
        debug!("resolved {} resource(s) for {id}", files.len());
        Ok(Resolved {
            files,
            _expansions: expansions,
        })
    }

    /// Return a staged artifact whose digest matches, downloading it when
    /// no usable copy is staged.
    fn stage_artifact(
        &self,
        id: &ManifestId,
        url: &str,
        spec: &ArtifactSpec,
    ) -> Result<Utf8PathBuf, ActionError> {
        let path = self
            .staging
            .artifact_path(url, &spec.sha256)
            .map_err(|err| ActionError::new(id, Stage::Fetch, staging_error(url, err)))?;

        if path.exists() {
            match verify(path.as_std_path(), &spec.sha256) {
                Ok(check) if check.matches() => {
                    debug!("reusing staged artifact {path}");
                    return Ok(path);
                }
                Ok(_) => debug!("staged artifact {path} is stale; fetching again"),
                Err(err) => debug!("staged artifact {path} is unreadable: {err}"),
            }
        }

        self.collaborators
            .fetcher
            .fetch(url, path.as_std_path())
            .map_err(|err| ActionError::new(id, Stage::Fetch, err))?;

        let check = verify(path.as_std_path(), &spec.sha256)
            .map_err(|err| ActionError::new(id, Stage::Verify, err))?;
        if !check.matches() {
            if let Err(err) = std::fs::remove_file(&path) {
                warn!("could not discard mismatched artifact {path}: {err}");
            }
            return Err(ActionError::new(
                id,
                Stage::Verify,
                StageError::DigestMismatch {
                    url: url.to_owned(),
                    expected: check.expected,
                    actual: check.actual,
                },
            ));
        }
        Ok(path)
    }

    fn place_all(
        &self,
        placement: &mut Placement,
        previous: Option<&InstalledRecord>,
        foreign: &BTreeMap<Utf8PathBuf, ManifestId>,
        resolved: &Resolved,
    ) -> Result<(), TargetError> {
        if let Some(previous) = previous {
            for file in &previous.files {
                if let Some(owner) = foreign.get(file) {
                    warn!("{file} is now recorded by {owner}; not replacing it");
                    return Err(TargetError::Conflict { path: file.clone() });
                }
                placement.displace(file)?;
            }
        }
        for (source, dest) in &resolved.files {
            placement.place(source, dest)?;
        }
        Ok(())
    }

    fn remove(&self, action: &Action, id: &ManifestId) -> Result<ActionReport, ActionError> {
        let store = self.collaborators.store;
        let Some(record) = store
            .get(id)
            .map_err(|err| ActionError::new(id, Stage::Record, err))?
        else {
            info!("{id} is not installed; nothing to remove");
            return Ok(ActionReport {
                action: action.clone(),
                outcome: Outcome::Removed,
                files: Vec::new(),
                hook_warning: None,
            });
        };

        let foreign = self.foreign_files(id)?;
        let mut removed = Vec::with_capacity(record.files.len());
        for file in &record.files {
            if let Some(owner) = foreign.get(file) {
                warn!("{file} is now recorded by {owner}; leaving it in place while removing {id}");
                continue;
            }
            let existed =
                remove_installed(file).map_err(|err| ActionError::new(id, Stage::Remove, err))?;
            if !existed {
                warn!("{file} was already missing while removing {id}");
            }
            removed.push(file.clone());
        }
        self.retry
            .run(&format!("deleting record for {id}"), || store.delete(id))
            .map_err(|err| ActionError::new(id, Stage::Record, err))?;

        Ok(ActionReport {
            action: action.clone(),
            outcome: Outcome::Removed,
            hook_warning: self.run_hook(&removed),
            files: removed,
        })
    }

    /// Map each file recorded by a manifest other than `id` to its owner.
    fn foreign_files(
        &self,
        id: &ManifestId,
    ) -> Result<BTreeMap<Utf8PathBuf, ManifestId>, ActionError> {
        let records = self
            .collaborators
            .store
            .records()
            .map_err(|err| ActionError::new(id, Stage::Record, err))?;
        Ok(records
            .into_values()
            .filter(|record| &record.id != id)
            .flat_map(|record| {
                let owner = record.id;
                record
                    .files
                    .into_iter()
                    .map(move |file| (file, owner.clone()))
            })
            .collect())
    }

    /// Notify the hook about the directories containing `files`.
    fn run_hook(&self, files: &[Utf8PathBuf]) -> Option<String> {
        let dirs: Vec<Utf8PathBuf> = files
            .iter()
            .filter_map(|file| file.parent().map(Utf8Path::to_path_buf))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if dirs.is_empty() {
            return None;
        }
        match self.collaborators.hook.after_change(&dirs) {
            Ok(()) => None,
            Err(err) => {
                warn!("post-install hook failed: {err}");
                Some(err.to_string())
            }
        }
    }
}

fn staging_error(path: &str, source: io::Error) -> StageError {
    StageError::Staging {
        path: path.to_owned(),
        source,
    }
}

fn utf8(path: &std::path::Path) -> Result<Utf8PathBuf, StageError> {
    Utf8PathBuf::try_from(path.to_path_buf()).map_err(|err| StageError::Staging {
        path: path.display().to_string(),
        source: err.into_io_error(),
    })
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;

//! Convergence planning.
//!
//! Planning is a pure function of the requested manifests and a snapshot of
//! installed records; it never touches the filesystem. Running a plan and
//! then planning again against the updated records yields no actions.

use crate::manifest::{Manifest, ManifestId, Version};
use crate::state::InstalledRecords;
use std::collections::BTreeSet;
use std::fmt;

/// A single change needed to converge one identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Install a manifest that has no record.
    Install {
        /// The manifest to install.
        manifest: Manifest,
        /// The version being installed.
        version: Version,
    },
    /// Replace an installed version with the manifest's version.
    Upgrade {
        /// The manifest to install.
        manifest: Manifest,
        /// Currently recorded version.
        from: Version,
        /// Version being installed.
        to: Version,
    },
    /// Remove an installed manifest.
    Remove {
        /// Identifier of the installed manifest.
        id: ManifestId,
        /// Recorded version being removed.
        version: Version,
    },
}

impl Action {
    /// Return the identifier this action changes.
    #[must_use]
    pub fn id(&self) -> &ManifestId {
        match self {
            Self::Install { manifest, .. } | Self::Upgrade { manifest, .. } => manifest.id(),
            Self::Remove { id, .. } => id,
        }
    }

    /// Return the manifest to install, if this action installs one.
    #[must_use]
    pub fn manifest(&self) -> Option<&Manifest> {
        match self {
            Self::Install { manifest, .. } | Self::Upgrade { manifest, .. } => Some(manifest),
            Self::Remove { .. } => None,
        }
    }

    /// Return the lowercase verb used in reports.
    #[must_use]
    pub const fn verb(&self) -> &'static str {
        match self {
            Self::Install { .. } => "install",
            Self::Upgrade { .. } => "upgrade",
            Self::Remove { .. } => "remove",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Install { manifest, version } => {
                write!(f, "install {} {version}", manifest.id())
            }
            Self::Upgrade { manifest, from, to } => {
                write!(f, "upgrade {} {from} -> {to}", manifest.id())
            }
            Self::Remove { id, version } => write!(f, "remove {id} {version}"),
        }
    }
}

/// Something the caller wants converged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Ensure the manifest's version is installed.
    Install(Manifest),
    /// Ensure nothing is installed for the identifier.
    Remove(ManifestId),
}

impl Request {
    /// Return the identifier the request concerns.
    #[must_use]
    pub fn id(&self) -> &ManifestId {
        match self {
            Self::Install(manifest) => manifest.id(),
            Self::Remove(id) => id,
        }
    }
}

/// Errors raised while planning.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    /// Two requests name the same identifier.
    #[error("more than one request for {id}")]
    DuplicateRequest {
        /// The repeated identifier.
        id: ManifestId,
    },
}

/// Plan the actions that converge `manifest` against `records`.
///
/// # Examples
///
/// ```
/// use caskwright_installer::planner::plan;
/// use caskwright_installer::state::InstalledRecords;
/// # use caskwright_installer::manifest::{ArtifactSpec, Manifest, ManifestId, ManifestParts, ResourceDeclaration, Version};
/// # let manifest = Manifest::new(ManifestParts {
/// #     id: ManifestId::try_from("font-example").expect("valid id"),
/// #     version: Version::try_from("1.0").expect("valid version"),
/// #     name: None, homepage: None, license: None,
/// #     artifacts: vec![ArtifactSpec {
/// #         url: "https://example.test/e.zip".try_into().expect("valid url"),
/// #         sha256: "a".repeat(64).try_into().expect("valid digest"),
/// #         archive: None,
/// #     }],
/// #     resources: vec![ResourceDeclaration::font("E.otf").expect("valid resource")],
/// # }).expect("valid manifest");
///
/// let actions = plan(&manifest, &InstalledRecords::new());
/// assert_eq!(actions.len(), 1);
/// assert_eq!(actions[0].to_string(), "install font-example 1.0");
/// ```
#[must_use]
pub fn plan(manifest: &Manifest, records: &InstalledRecords) -> Vec<Action> {
    match records.get(manifest.id()) {
        None => vec![Action::Install {
            manifest: manifest.clone(),
            version: manifest.version().clone(),
        }],
        Some(record) if &record.version == manifest.version() => Vec::new(),
        Some(record) => vec![Action::Upgrade {
            manifest: manifest.clone(),
            from: record.version.clone(),
            to: manifest.version().clone(),
        }],
    }
}

/// Plan the removal of `id`. Nothing is planned when it is not installed.
#[must_use]
pub fn plan_removal(id: &ManifestId, records: &InstalledRecords) -> Vec<Action> {
    records
        .get(id)
        .map(|record| Action::Remove {
            id: id.clone(),
            version: record.version.clone(),
        })
        .into_iter()
        .collect()
}

/// Plan a batch of requests, preserving request order.
///
/// # Errors
///
/// Returns [`PlanError::DuplicateRequest`] when two requests share an
/// identifier, since their relative order would be ambiguous.
pub fn plan_all(requests: &[Request], records: &InstalledRecords) -> Result<Vec<Action>, PlanError> {
    let mut seen = BTreeSet::new();
    let mut actions = Vec::new();
    for request in requests {
        if !seen.insert(request.id()) {
            return Err(PlanError::DuplicateRequest {
                id: request.id().clone(),
            });
        }
        match request {
            Request::Install(manifest) => actions.extend(plan(manifest, records)),
            Request::Remove(id) => actions.extend(plan_removal(id, records)),
        }
    }
    Ok(actions)
}

//! Manifest schema types.
//!
//! A manifest describes one installable bundle: where to download it, the
//! digest that proves the download is genuine, and which files inside it are
//! installed. The document shape mirrors this JSON:
//!
//! ```json
//! {
//!   "id": "font-latin-modern",
//!   "version": "2.004",
//!   "name": "Latin Modern",
//!   "homepage": "http://www.gust.org.pl/projects/e-foundry/latin-modern",
//!   "license": "oss",
//!   "artifacts": [{
//!     "url": "http://www.gust.org.pl/projects/e-foundry/latin-modern/download/lm{version}otf.zip",
//!     "sha256": "5b0236051d3728be6616f1b274e3b910473875b5a3ef9382f0ef00384ddb161b",
//!     "archive": "zip"
//!   }],
//!   "resources": [{ "kind": "font", "file": "lmroman10-regular.otf" }]
//! }
//! ```

use super::archive_kind::ArchiveKind;
use super::error::{ManifestError, Result};
use super::identifier::ManifestId;
use super::sha256_digest::Sha256Digest;
use super::url_template::UrlTemplate;
use super::version::Version;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Component, Path};

/// Logical kind of an installed resource, which decides its destination
/// directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// A font file, installed into the user font directory.
    Font,
    /// Any other file, installed into the generic resources directory.
    File,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Font => f.write_str("font"),
            Self::File => f.write_str("file"),
        }
    }
}

/// One file the manifest expects to find inside its expanded artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawResource")]
pub struct ResourceDeclaration {
    kind: ResourceKind,
    file: String,
}

#[derive(Deserialize)]
struct RawResource {
    kind: ResourceKind,
    file: String,
}

impl TryFrom<RawResource> for ResourceDeclaration {
    type Error = ManifestError;

    fn try_from(raw: RawResource) -> Result<Self> {
        Self::new(raw.kind, raw.file)
    }
}

impl ResourceDeclaration {
    /// Declare a resource, rejecting empty, absolute, or escaping paths.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::InvalidResourcePath`] when `file` cannot be
    /// resolved safely inside an extraction root.
    pub fn new(kind: ResourceKind, file: impl Into<String>) -> Result<Self> {
        let file = file.into().replace('\\', "/");
        validate_resource_path(&file)?;
        Ok(Self { kind, file })
    }

    /// Shorthand for a font resource.
    ///
    /// # Errors
    ///
    /// See [`ResourceDeclaration::new`].
    pub fn font(file: impl Into<String>) -> Result<Self> {
        Self::new(ResourceKind::Font, file)
    }

    /// Return the resource kind.
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Return the declared path, relative to the artifact root.
    #[must_use]
    pub fn file(&self) -> &str {
        &self.file
    }

    /// Return the final path component, which becomes the installed name.
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.file.rsplit('/').next().unwrap_or(&self.file)
    }
}

fn validate_resource_path(file: &str) -> Result<()> {
    let invalid = |reason: &str| ManifestError::InvalidResourcePath {
        value: file.to_owned(),
        reason: reason.to_owned(),
    };
    if file.is_empty() || file.ends_with('/') {
        return Err(invalid("path must name a file"));
    }
    let path = Path::new(file);
    if path.is_absolute() || file.starts_with('/') {
        return Err(invalid("path must be relative"));
    }
    for component in path.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir => return Err(invalid("path must not contain \"..\"")),
            Component::RootDir | Component::Prefix(_) => {
                return Err(invalid("path must be relative"));
            }
        }
    }
    Ok(())
}

/// A downloadable artifact and the digest it must hash to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactSpec {
    /// Download location, possibly containing version placeholders.
    pub url: UrlTemplate,
    /// Published SHA-256 digest of the downloaded bytes.
    pub sha256: Sha256Digest,
    /// Container format; inferred from the URL when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive: Option<ArchiveKind>,
}

impl ArtifactSpec {
    /// Return the declared archive kind, or infer it from the URL template.
    #[must_use]
    pub fn archive_kind(&self) -> ArchiveKind {
        self.archive
            .unwrap_or_else(|| ArchiveKind::infer(self.url.as_str()))
    }

    /// Expand the URL template for `version`.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::InvalidUrl`] when the expansion is not an
    /// absolute URL.
    pub fn url_for(&self, version: &Version) -> Result<String> {
        self.url.expand(version)
    }
}

/// Field groups used to construct a [`Manifest`].
///
/// Keeps the constructor within Clippy's parameter limit while leaving every
/// field explicit at the call site.
#[derive(Debug, Clone)]
pub struct ManifestParts {
    /// Globally unique identifier.
    pub id: ManifestId,
    /// Published version.
    pub version: Version,
    /// Human-readable name.
    pub name: Option<String>,
    /// Project homepage (informational).
    pub homepage: Option<String>,
    /// License tag (informational).
    pub license: Option<String>,
    /// Downloadable artifacts; at least one.
    pub artifacts: Vec<ArtifactSpec>,
    /// Resources to install, in declaration order; at least one.
    pub resources: Vec<ResourceDeclaration>,
}

/// A validated, read-only manifest.
///
/// # Examples
///
/// ```
/// use caskwright_installer::manifest::{
///     ArtifactSpec, Manifest, ManifestId, ManifestParts, ResourceDeclaration, Version,
/// };
///
/// let manifest = Manifest::new(ManifestParts {
///     id: ManifestId::try_from("font-example").expect("valid id"),
///     version: Version::try_from("1.0").expect("valid version"),
///     name: None,
///     homepage: None,
///     license: None,
///     artifacts: vec![ArtifactSpec {
///         url: "https://example.test/example-{version}.zip".try_into().expect("valid url"),
///         sha256: "a".repeat(64).try_into().expect("valid digest"),
///         archive: None,
///     }],
///     resources: vec![ResourceDeclaration::font("Example.otf").expect("valid resource")],
/// })
/// .expect("valid manifest");
/// assert_eq!(manifest.resources().len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawManifest")]
pub struct Manifest {
    id: ManifestId,
    version: Version,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    homepage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    license: Option<String>,
    artifacts: Vec<ArtifactSpec>,
    resources: Vec<ResourceDeclaration>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawManifest {
    id: ManifestId,
    version: Version,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    homepage: Option<String>,
    #[serde(default)]
    license: Option<String>,
    artifacts: Vec<ArtifactSpec>,
    resources: Vec<ResourceDeclaration>,
}

impl TryFrom<RawManifest> for Manifest {
    type Error = ManifestError;

    fn try_from(raw: RawManifest) -> Result<Self> {
        Self::new(ManifestParts {
            id: raw.id,
            version: raw.version,
            name: raw.name,
            homepage: raw.homepage,
            license: raw.license,
            artifacts: raw.artifacts,
            resources: raw.resources,
        })
    }
}

impl Manifest {
    /// Construct a manifest, enforcing cross-field invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::NoArtifacts`] or [`ManifestError::NoResources`]
    /// for empty lists, [`ManifestError::DuplicateResource`] when two resources
    /// of one kind share an installed file name, and
    /// [`ManifestError::InvalidUrl`] when an artifact URL does not expand to
    /// an absolute URL for this version.
    pub fn new(parts: ManifestParts) -> Result<Self> {
        if parts.artifacts.is_empty() {
            return Err(ManifestError::NoArtifacts {
                id: parts.id.into_inner(),
            });
        }
        if parts.resources.is_empty() {
            return Err(ManifestError::NoResources {
                id: parts.id.into_inner(),
            });
        }
        let mut seen = BTreeSet::new();
        for resource in &parts.resources {
            if !seen.insert((resource.kind(), resource.file_name())) {
                return Err(ManifestError::DuplicateResource {
                    id: parts.id.into_inner(),
                    file: resource.file_name().to_owned(),
                });
            }
        }
        for artifact in &parts.artifacts {
            artifact.url_for(&parts.version)?;
        }
        Ok(Self {
            id: parts.id,
            version: parts.version,
            name: parts.name,
            homepage: parts.homepage,
            license: parts.license,
            artifacts: parts.artifacts,
            resources: parts.resources,
        })
    }

    /// Return the manifest identifier.
    #[must_use]
    pub fn id(&self) -> &ManifestId {
        &self.id
    }

    /// Return the published version.
    #[must_use]
    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Return the human-readable name, falling back to the identifier.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(self.id.as_str())
    }

    /// Return the homepage, if declared.
    #[must_use]
    pub fn homepage(&self) -> Option<&str> {
        self.homepage.as_deref()
    }

    /// Return the license tag, if declared.
    #[must_use]
    pub fn license(&self) -> Option<&str> {
        self.license.as_deref()
    }

    /// Return the declared artifacts.
    #[must_use]
    pub fn artifacts(&self) -> &[ArtifactSpec] {
        &self.artifacts
    }

    /// Return the declared resources in declaration order.
    #[must_use]
    pub fn resources(&self) -> &[ResourceDeclaration] {
        &self.resources
    }
}

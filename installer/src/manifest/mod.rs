//! Manifest data model: the parsed, validated description of one installable
//! resource bundle.
//!
//! Manifests arrive from an external source (JSON or TOML documents) and are
//! read-only once constructed. Every field is validated at parse time through
//! `TryFrom` newtypes so that the planner and executor never see malformed
//! identifiers, digests, or URL templates.
//!
//! # Sub-modules
//!
//! - [`archive_kind`] - Container format of a downloadable artifact.
//! - [`error`] - Validation errors for manifest fields.
//! - [`identifier`] - Manifest identifier newtype (`ManifestId`).
//! - [`model`] - `Manifest`, `ArtifactSpec`, and `ResourceDeclaration`.
//! - [`parser`] - JSON and TOML manifest loading.
//! - [`set`] - Identifier-keyed manifest collections.
//! - [`sha256_digest`] - SHA-256 digest newtype (`Sha256Digest`).
//! - [`url_template`] - Version interpolation for artifact URLs.
//! - [`version`] - Opaque, lexically compared version strings.

pub mod archive_kind;
pub mod error;
pub mod identifier;
pub mod model;
pub mod parser;
pub mod set;
pub mod sha256_digest;
pub mod url_template;
pub mod version;

pub use archive_kind::ArchiveKind;
pub use error::ManifestError;
pub use identifier::ManifestId;
pub use model::{ArtifactSpec, Manifest, ManifestParts, ResourceDeclaration, ResourceKind};
pub use parser::{load_manifest, parse_manifest_json, parse_manifest_toml};
pub use set::ManifestSet;
pub use sha256_digest::Sha256Digest;
pub use url_template::{UrlTemplate, expand_url};
pub use version::Version;

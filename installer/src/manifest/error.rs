//! Error types for manifest validation.
//!
//! Each variant names the rejected value and the constraint it violated.

use thiserror::Error;

/// Errors arising from invalid manifest values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManifestError {
    /// A manifest identifier is empty or contains forbidden characters.
    #[error("invalid manifest identifier \"{value}\": {reason}")]
    InvalidIdentifier {
        /// The rejected identifier.
        value: String,
        /// Description of the validation failure.
        reason: String,
    },

    /// A version string is empty or contains forbidden characters.
    #[error("invalid version \"{value}\": {reason}")]
    InvalidVersion {
        /// The rejected version string.
        value: String,
        /// Description of the validation failure.
        reason: String,
    },

    /// A SHA-256 digest is not a valid 64-character hex string.
    #[error("invalid SHA-256 digest: {reason}")]
    InvalidSha256Digest {
        /// Description of the validation failure.
        reason: String,
    },

    /// A URL template references an unknown placeholder or is malformed.
    #[error("invalid URL template \"{template}\": {reason}")]
    InvalidUrlTemplate {
        /// The rejected template.
        template: String,
        /// Description of the validation failure.
        reason: String,
    },

    /// An expanded URL is not an absolute URL with a supported scheme.
    #[error("invalid artifact URL \"{url}\": {reason}")]
    InvalidUrl {
        /// The rejected URL.
        url: String,
        /// Description of the validation failure.
        reason: String,
    },

    /// The archive kind is not one of the supported container formats.
    #[error("unsupported archive kind \"{value}\"; expected one of: {expected}")]
    UnsupportedArchiveKind {
        /// The rejected archive kind.
        value: String,
        /// Comma-separated list of accepted kinds.
        expected: String,
    },

    /// A resource file name is empty, absolute, or escapes the artifact root.
    #[error("invalid resource path \"{value}\": {reason}")]
    InvalidResourcePath {
        /// The rejected path.
        value: String,
        /// Description of the validation failure.
        reason: String,
    },

    /// The manifest declares no artifacts.
    #[error("manifest {id} declares no artifacts")]
    NoArtifacts {
        /// Identifier of the offending manifest.
        id: String,
    },

    /// The manifest declares no resources.
    #[error("manifest {id} declares no resources")]
    NoResources {
        /// Identifier of the offending manifest.
        id: String,
    },

    /// Two resources of the same kind would install to the same file name.
    #[error("manifest {id} declares resource {file} more than once")]
    DuplicateResource {
        /// Identifier of the offending manifest.
        id: String,
        /// The repeated file name.
        file: String,
    },

    /// Two manifests in one set share an identifier.
    #[error("manifest identifier {id} is declared more than once")]
    DuplicateManifest {
        /// The repeated identifier.
        id: String,
    },
}

/// Result type alias using [`ManifestError`].
pub type Result<T> = std::result::Result<T, ManifestError>;

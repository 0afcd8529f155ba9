//! Manifest loading from JSON and TOML documents.
//!
//! Field validation runs during deserialisation, so a manifest that parses is
//! a manifest the planner and executor can trust.

use super::model::Manifest;
use std::path::{Path, PathBuf};

/// Errors arising from manifest parsing.
#[derive(Debug, thiserror::Error)]
pub enum ManifestParseError {
    /// JSON deserialisation or field validation failed.
    #[error("manifest JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML deserialisation or field validation failed.
    #[error("manifest TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// The manifest file could not be read.
    #[error("failed to read manifest {path}: {source}")]
    Read {
        /// Path that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file extension names no supported manifest format.
    #[error("unsupported manifest format for {path}; expected .json or .toml")]
    UnsupportedFormat {
        /// Path with the unrecognised extension.
        path: PathBuf,
    },
}

/// Parse a JSON manifest document.
///
/// # Errors
///
/// Returns an error if the JSON is malformed or any field fails validation.
///
/// # Examples
///
/// ```
/// use caskwright_installer::manifest::parse_manifest_json;
///
/// let json = concat!(
///     r#"{"id":"font-example","version":"1.0","#,
///     r#""artifacts":[{"url":"https://example.test/f-{version}.zip","#,
///     r#""sha256":"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"}],"#,
///     r#""resources":[{"kind":"font","file":"Example.otf"}]}"#,
/// );
/// let manifest = parse_manifest_json(json).expect("valid manifest");
/// assert_eq!(manifest.id().as_str(), "font-example");
/// ```
pub fn parse_manifest_json(json: &str) -> Result<Manifest, ManifestParseError> {
    Ok(serde_json::from_str(json)?)
}

/// Parse a TOML manifest document.
///
/// # Errors
///
/// Returns an error if the TOML is malformed or any field fails validation.
pub fn parse_manifest_toml(text: &str) -> Result<Manifest, ManifestParseError> {
    Ok(toml::from_str(text)?)
}

/// Load a manifest from disk, choosing the format from the file extension.
///
/// # Errors
///
/// Returns [`ManifestParseError::Read`] when the file cannot be read,
/// [`ManifestParseError::UnsupportedFormat`] for unknown extensions, and a
/// parse error for malformed content.
pub fn load_manifest(path: &Path) -> Result<Manifest, ManifestParseError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    let parse: fn(&str) -> Result<Manifest, ManifestParseError> = match extension.as_deref() {
        Some("json") => parse_manifest_json,
        Some("toml") => parse_manifest_toml,
        _ => {
            return Err(ManifestParseError::UnsupportedFormat {
                path: path.to_path_buf(),
            });
        }
    };
    let text = std::fs::read_to_string(path).map_err(|source| ManifestParseError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&text)
}

//! Manifest identifier newtype.
//!
//! Identifiers are global keys: they name state records on disk and group
//! actions for per-identifier serialisation, so they are restricted to a
//! conservative, file-name-safe alphabet.

use super::error::{ManifestError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum identifier length, keeping record file names well within
/// platform path-component limits.
const MAX_LEN: usize = 128;

/// A validated manifest identifier such as `font-latin-modern`.
///
/// # Examples
///
/// ```
/// use caskwright_installer::manifest::ManifestId;
///
/// let id = ManifestId::try_from("font-latin-modern").expect("valid identifier");
/// assert_eq!(id.as_str(), "font-latin-modern");
/// assert!(ManifestId::try_from("../etc").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ManifestId(String);

impl ManifestId {
    /// Return the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the wrapper and return the inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl TryFrom<&str> for ManifestId {
    type Error = ManifestError;

    fn try_from(value: &str) -> Result<Self> {
        validate_identifier(value)?;
        Ok(Self(value.to_owned()))
    }
}

impl TryFrom<String> for ManifestId {
    type Error = ManifestError;

    fn try_from(value: String) -> Result<Self> {
        validate_identifier(&value)?;
        Ok(Self(value))
    }
}

impl From<ManifestId> for String {
    fn from(value: ManifestId) -> Self {
        value.0
    }
}

impl AsRef<str> for ManifestId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ManifestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn invalid(value: &str, reason: impl Into<String>) -> ManifestError {
    ManifestError::InvalidIdentifier {
        value: value.to_owned(),
        reason: reason.into(),
    }
}

/// Validate that `value` is a well-formed manifest identifier.
fn validate_identifier(value: &str) -> Result<()> {
    let Some(first) = value.chars().next() else {
        return Err(invalid(value, "identifier must not be empty"));
    };
    if value.len() > MAX_LEN {
        return Err(invalid(
            value,
            format!("identifier exceeds {MAX_LEN} characters"),
        ));
    }
    if !first.is_ascii_lowercase() && !first.is_ascii_digit() {
        return Err(invalid(
            value,
            "identifier must start with a lowercase letter or digit",
        ));
    }
    if let Some(bad) = value
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | '.')))
    {
        return Err(invalid(value, format!("forbidden character '{bad}'")));
    }
    if value.contains("..") {
        return Err(invalid(value, "identifier must not contain \"..\""));
    }
    Ok(())
}

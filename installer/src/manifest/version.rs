//! Opaque manifest version strings.
//!
//! Versions are compared for equality only. Upstream projects use whatever
//! scheme they like (`2.004`, `1.2,345`, `latest`), so no ordering is implied
//! and `Version` intentionally does not implement `Ord`.

use super::error::{ManifestError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A validated, lexically compared version string.
///
/// # Examples
///
/// ```
/// use caskwright_installer::manifest::Version;
///
/// let v = Version::try_from("2.004").expect("valid version");
/// assert_eq!(v.major(), "2");
/// assert_eq!(v.no_dots(), "2004");
/// assert_ne!(v, Version::try_from("2.4").expect("valid version"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version(String);

impl Version {
    /// Return the version as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Return the portion before the first `.` (the whole string when there
    /// is no dot).
    #[must_use]
    pub fn major(&self) -> &str {
        self.dotted_part(0).unwrap_or(&self.0)
    }

    /// Return the portion between the first and second `.`, or an empty
    /// string when the version has no minor component.
    #[must_use]
    pub fn minor(&self) -> &str {
        self.dotted_part(1).unwrap_or("")
    }

    /// Return the version with every `.` removed.
    #[must_use]
    pub fn no_dots(&self) -> String {
        self.0.replace('.', "")
    }

    /// Return the portion before the first `,` (the whole string when there
    /// is no comma).
    #[must_use]
    pub fn before_comma(&self) -> &str {
        self.0.split(',').next().unwrap_or(&self.0)
    }

    /// Return the portion after the first `,`, or an empty string.
    #[must_use]
    pub fn after_comma(&self) -> &str {
        self.0.split_once(',').map_or("", |(_, after)| after)
    }

    fn dotted_part(&self, index: usize) -> Option<&str> {
        self.before_comma().split('.').nth(index)
    }
}

impl TryFrom<&str> for Version {
    type Error = ManifestError;

    fn try_from(value: &str) -> Result<Self> {
        validate_version(value)?;
        Ok(Self(value.to_owned()))
    }
}

impl TryFrom<String> for Version {
    type Error = ManifestError;

    fn try_from(value: String) -> Result<Self> {
        validate_version(&value)?;
        Ok(Self(value))
    }
}

impl From<Version> for String {
    fn from(value: Version) -> Self {
        value.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn validate_version(value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(ManifestError::InvalidVersion {
            value: value.to_owned(),
            reason: "version must not be empty".to_owned(),
        });
    }
    if let Some(bad) = value
        .chars()
        .find(|c| c.is_whitespace() || c.is_control() || matches!(c, '/' | '\\'))
    {
        return Err(ManifestError::InvalidVersion {
            value: value.to_owned(),
            reason: format!("forbidden character {bad:?}"),
        });
    }
    Ok(())
}

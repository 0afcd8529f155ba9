//! Container formats for downloadable artifacts.

use super::error::{ManifestError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a staged artifact must be unpacked before its resources can be found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ArchiveKind {
    /// The artifact is the resource itself.
    #[default]
    None,
    /// A zip archive.
    Zip,
    /// An uncompressed tar archive.
    Tar,
    /// A gzip-compressed tar archive.
    TarGz,
    /// A zstd-compressed tar archive.
    TarZst,
}

/// Every supported kind, in the order used for error messages.
const ALL: [ArchiveKind; 5] = [
    ArchiveKind::None,
    ArchiveKind::Zip,
    ArchiveKind::Tar,
    ArchiveKind::TarGz,
    ArchiveKind::TarZst,
];

impl ArchiveKind {
    /// Return the canonical manifest spelling of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Zip => "zip",
            Self::Tar => "tar",
            Self::TarGz => "tar.gz",
            Self::TarZst => "tar.zst",
        }
    }

    /// Guess the archive kind from a URL or file name suffix.
    ///
    /// Unknown suffixes are treated as [`ArchiveKind::None`], matching the
    /// common case of single-file font downloads.
    ///
    /// # Examples
    ///
    /// ```
    /// use caskwright_installer::manifest::ArchiveKind;
    ///
    /// assert_eq!(ArchiveKind::infer("https://example.test/lm2.004otf.zip"), ArchiveKind::Zip);
    /// assert_eq!(ArchiveKind::infer("fonts.tgz"), ArchiveKind::TarGz);
    /// assert_eq!(ArchiveKind::infer("Inter.otf"), ArchiveKind::None);
    /// ```
    #[must_use]
    pub fn infer(name: &str) -> Self {
        let path = name.split(['?', '#']).next().unwrap_or(name);
        let lower = path.to_ascii_lowercase();
        if lower.ends_with(".zip") {
            Self::Zip
        } else if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Self::TarGz
        } else if lower.ends_with(".tar.zst") || lower.ends_with(".tzst") {
            Self::TarZst
        } else if lower.ends_with(".tar") {
            Self::Tar
        } else {
            Self::None
        }
    }
}

impl TryFrom<&str> for ArchiveKind {
    type Error = ManifestError;

    fn try_from(value: &str) -> Result<Self> {
        let normalised = value.trim().to_ascii_lowercase();
        let alias = match normalised.as_str() {
            "tgz" => "tar.gz",
            "tzst" => "tar.zst",
            "" => "none",
            other => other,
        };
        ALL.into_iter()
            .find(|kind| kind.as_str() == alias)
            .ok_or_else(|| ManifestError::UnsupportedArchiveKind {
                value: value.to_owned(),
                expected: ALL.map(Self::as_str).join(", "),
            })
    }
}

impl TryFrom<String> for ArchiveKind {
    type Error = ManifestError;

    fn try_from(value: String) -> Result<Self> {
        Self::try_from(value.as_str())
    }
}

impl From<ArchiveKind> for String {
    fn from(value: ArchiveKind) -> Self {
        value.as_str().to_owned()
    }
}

impl fmt::Display for ArchiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("zip", ArchiveKind::Zip)]
    #[case("ZIP", ArchiveKind::Zip)]
    #[case("tgz", ArchiveKind::TarGz)]
    #[case("tar.zst", ArchiveKind::TarZst)]
    #[case("none", ArchiveKind::None)]
    fn parses_known_kinds(#[case] raw: &str, #[case] expected: ArchiveKind) {
        assert_eq!(ArchiveKind::try_from(raw), Ok(expected));
    }

    #[test]
    fn rejects_unknown_kind() {
        let err = ArchiveKind::try_from("rar").expect_err("rar is unsupported");
        assert!(err.to_string().contains("tar.zst"));
    }

    #[rstest]
    #[case("http://x/lm2.004otf.zip", ArchiveKind::Zip)]
    #[case("http://x/fonts.tar.gz?download=1", ArchiveKind::TarGz)]
    #[case("http://x/fonts.tar", ArchiveKind::Tar)]
    #[case("http://x/Font.ttf", ArchiveKind::None)]
    fn infers_from_url(#[case] url: &str, #[case] expected: ArchiveKind) {
        assert_eq!(ArchiveKind::infer(url), expected);
    }
}

//! Mapping from archive member names to extracted files.

use camino::{Utf8Path, Utf8PathBuf};
use std::collections::BTreeMap;

/// Errors from resolving a declared resource against an expanded artifact.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    /// No member matches the declared path.
    #[error("resource {declared} not found in artifact")]
    Missing {
        /// The declared resource path.
        declared: String,
    },

    /// The declared file name matches several members in different
    /// directories and no member matches the full path.
    #[error("resource {declared} is ambiguous: {candidates:?}")]
    Ambiguous {
        /// The declared resource path.
        declared: String,
        /// Member paths that share the declared file name.
        candidates: Vec<String>,
    },
}

/// Ordered map from `/`-separated member path to its extracted location.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberMap {
    members: BTreeMap<String, Utf8PathBuf>,
}

impl MemberMap {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `member` was extracted to `path`. A later insert for the
    /// same member replaces the earlier one.
    pub fn insert(&mut self, member: impl Into<String>, path: Utf8PathBuf) {
        self.members.insert(member.into(), path);
    }

    /// Merge `other` into `self`. Members already present win, so the first
    /// artifact listed in a manifest takes precedence.
    pub fn merge(&mut self, other: Self) {
        for (member, path) in other.members {
            self.members.entry(member).or_insert(path);
        }
    }

    /// Return the number of mapped members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Return `true` when nothing was mapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Look up a member by exact path.
    #[must_use]
    pub fn get(&self, member: &str) -> Option<&Utf8Path> {
        self.members.get(member).map(Utf8PathBuf::as_path)
    }

    /// Iterate over `(member, extracted path)` pairs in member order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Utf8Path)> {
        self.members
            .iter()
            .map(|(member, path)| (member.as_str(), path.as_path()))
    }

    /// Find the extracted file for a declared resource path.
    ///
    /// An exact member path match wins. Otherwise the final path component
    /// of `declared` must match exactly one member's final component.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Missing`] when nothing matches and
    /// [`ResolveError::Ambiguous`] when several members share the name.
    ///
    /// # Examples
    ///
    /// ```
    /// use caskwright_installer::artifact::members::MemberMap;
    /// use camino::Utf8PathBuf;
    ///
    /// let mut map = MemberMap::new();
    /// map.insert("otf/lmroman10-bold.otf", Utf8PathBuf::from("/tmp/x/otf/lmroman10-bold.otf"));
    /// let path = map.resolve("lmroman10-bold.otf").expect("resolves by file name");
    /// assert_eq!(path.file_name(), Some("lmroman10-bold.otf"));
    /// ```
    pub fn resolve(&self, declared: &str) -> Result<&Utf8Path, ResolveError> {
        let normalised = declared.trim_start_matches("./");
        if let Some(path) = self.get(normalised) {
            return Ok(path);
        }

        let wanted = basename(normalised);
        let mut candidates = self
            .members
            .iter()
            .filter(|(member, _)| basename(member) == wanted);
        match (candidates.next(), candidates.next()) {
            (Some((_, path)), None) => Ok(path.as_path()),
            (None, _) => Err(ResolveError::Missing {
                declared: declared.to_owned(),
            }),
            (Some(first), Some(second)) => {
                let mut names = vec![first.0.clone(), second.0.clone()];
                names.extend(candidates.map(|(member, _)| member.clone()));
                Err(ResolveError::Ambiguous {
                    declared: declared.to_owned(),
                    candidates: names,
                })
            }
        }
    }
}

fn basename(member: &str) -> &str {
    member.rsplit('/').next().unwrap_or(member)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn map() -> MemberMap {
        let mut map = MemberMap::new();
        map.insert("lm2.004otf/lmroman10-regular.otf", "/x/a".into());
        map.insert("lm2.004otf/lmmono10-italic.otf", "/x/b".into());
        map.insert("doc/README", "/x/c".into());
        map.insert("other/README", "/x/d".into());
        map
    }

    #[rstest]
    #[case::exact("doc/README", "/x/c")]
    #[case::dot_slash("./doc/README", "/x/c")]
    #[case::basename("lmroman10-regular.otf", "/x/a")]
    #[case::different_dir("fonts/lmmono10-italic.otf", "/x/b")]
    fn resolves(map: MemberMap, #[case] declared: &str, #[case] expected: &str) {
        assert_eq!(
            map.resolve(declared).expect("resolves"),
            Utf8Path::new(expected)
        );
    }

    #[rstest]
    fn missing_member(map: MemberMap) {
        assert_eq!(
            map.resolve("lmsans10-bold.otf"),
            Err(ResolveError::Missing {
                declared: "lmsans10-bold.otf".to_owned()
            })
        );
    }

    #[rstest]
    fn ambiguous_member(map: MemberMap) {
        let err = map.resolve("README").expect_err("ambiguous");
        assert_eq!(
            err,
            ResolveError::Ambiguous {
                declared: "README".to_owned(),
                candidates: vec!["doc/README".to_owned(), "other/README".to_owned()],
            }
        );
    }

    #[test]
    fn merge_keeps_first_mapping() {
        let mut first = MemberMap::new();
        first.insert("a.otf", "/one/a.otf".into());
        let mut second = MemberMap::new();
        second.insert("a.otf", "/two/a.otf".into());
        second.insert("b.otf", "/two/b.otf".into());

        first.merge(second);
        assert_eq!(first.len(), 2);
        assert_eq!(first.get("a.otf"), Some(Utf8Path::new("/one/a.otf")));
    }
}

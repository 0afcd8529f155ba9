//! Staging directory layout.
//!
//! Downloads and expansions happen under a single staging root:
//!
//! ```text
//! <staging>/<cache-key>/<artifact file name>
//! <staging>/<cache-key>/expand-XXXXXX/...
//! ```
//!
//! The cache key is derived from the `(url, digest)` pair, so two manifests
//! that publish the same bytes at the same location share one download, and
//! a digest change never reuses a stale file. Nothing here is durable: on
//! start-up, anything left in the staging root belongs to an action that
//! never recorded its result and is discarded.
//!
//! A run that stages anything first takes [`StagingArea::lock`], an
//! exclusive advisory lock on `<staging>/.lock`, so a second process never
//! discards work that is still in progress.

use crate::manifest::Sha256Digest;
use camino::{Utf8Path, Utf8PathBuf};
use fs2::FileExt;
use log::{debug, info};
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io;
use tempfile::TempDir;

/// Number of hex characters of the `(url, digest)` hash used as a key.
const CACHE_KEY_LEN: usize = 16;

/// File name used when a URL has no usable final path segment.
const FALLBACK_FILE_NAME: &str = "artifact";

/// Lock file guarding a staging root across processes.
const LOCK_FILE_NAME: &str = ".lock";

/// Exclusive hold on a staging root. Closing the file releases the lock.
#[derive(Debug)]
pub struct StagingLock {
    _file: File,
}

/// Handles the on-disk layout of staged artifacts.
#[derive(Debug, Clone)]
pub struct StagingArea {
    root: Utf8PathBuf,
}

impl StagingArea {
    /// Create a staging area rooted at `root`. The directory is created
    /// lazily.
    #[must_use]
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    /// Return the staging root.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Take the staging root's lock, waiting while another process holds it.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the root or the lock file cannot be created,
    /// or locking fails for a reason other than contention.
    pub fn lock(&self) -> io::Result<StagingLock> {
        fs::create_dir_all(&self.root)?;
        let path = self.root.join(LOCK_FILE_NAME);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;
        if let Err(err) = file.try_lock_exclusive() {
            if err.kind() != fs2::lock_contended_error().kind() {
                return Err(err);
            }
            info!("waiting for another run to release {path}");
            file.lock_exclusive()?;
        }
        Ok(StagingLock { _file: file })
    }

    /// Derive the cache key for an artifact.
    ///
    /// # Examples
    ///
    /// ```
    /// use caskwright_installer::artifact::staging::StagingArea;
    /// use caskwright_installer::manifest::Sha256Digest;
    ///
    /// let digest = Sha256Digest::try_from("a".repeat(64)).expect("valid digest");
    /// let key = StagingArea::cache_key("https://example.test/f.zip", &digest);
    /// assert_eq!(key.len(), 16);
    /// ```
    #[must_use]
    pub fn cache_key(url: &str, digest: &Sha256Digest) -> String {
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        hasher.update(b"\n");
        hasher.update(digest.as_str().as_bytes());
        let hex = format!("{:x}", hasher.finalize());
        hex.get(..CACHE_KEY_LEN).unwrap_or(&hex).to_owned()
    }

    /// Return the directory holding everything staged for `key`.
    #[must_use]
    pub fn key_dir(&self, key: &str) -> Utf8PathBuf {
        self.root.join(key)
    }

    /// Return the staged file path for an artifact, creating its directory.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the key directory cannot be created.
    pub fn artifact_path(&self, url: &str, digest: &Sha256Digest) -> io::Result<Utf8PathBuf> {
        let dir = self.key_dir(&Self::cache_key(url, digest));
        fs::create_dir_all(&dir)?;
        Ok(dir.join(staged_file_name(url)))
    }

    /// Create a fresh, empty expansion directory for `key`.
    ///
    /// The directory is removed when the returned guard is dropped.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory cannot be created.
    pub fn expansion_dir(&self, key: &str) -> io::Result<TempDir> {
        let parent = self.key_dir(key);
        fs::create_dir_all(&parent)?;
        tempfile::Builder::new()
            .prefix("expand-")
            .tempdir_in(parent.as_std_path())
    }

    /// Remove everything staged for one artifact.
    ///
    /// # Errors
    ///
    /// Returns an I/O error other than "not found".
    pub fn discard(&self, url: &str, digest: &Sha256Digest) -> io::Result<()> {
        let dir = self.key_dir(&Self::cache_key(url, digest));
        match fs::remove_dir_all(&dir) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
            _ => Ok(()),
        }
    }

    /// Remove every entry below the staging root except the lock file and
    /// return how many were removed. Called on start-up, with the lock held:
    /// staged-but-unrecorded work is garbage.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the root exists but cannot be listed or an
    /// entry cannot be removed.
    pub fn discard_stale(&self) -> io::Result<usize> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(err),
        };
        let mut removed = 0;
        for entry in entries {
            let entry = entry?;
            if entry.file_name() == LOCK_FILE_NAME {
                continue;
            }
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
            debug!("discarded stale staging entry {}", path.display());
            removed += 1;
        }
        Ok(removed)
    }
}

/// Derive a safe staged file name from the final URL path segment.
fn staged_file_name(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let segment = path.rsplit('/').next().unwrap_or_default();
    let cleaned: String = segment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        FALLBACK_FILE_NAME.to_owned()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn digest(c: char) -> Sha256Digest {
        Sha256Digest::try_from(c.to_string().repeat(64)).expect("valid digest")
    }

    fn staging() -> (TempDir, StagingArea) {
        let temp = tempfile::tempdir().expect("temp dir");
        let root = Utf8PathBuf::try_from(temp.path().join("staging")).expect("UTF-8 path");
        (temp, StagingArea::new(root))
    }

    #[test]
    fn cache_key_depends_on_url_and_digest() {
        let url = "https://x.test/lm2.004otf.zip";
        assert_eq!(
            StagingArea::cache_key(url, &digest('a')),
            StagingArea::cache_key(url, &digest('a'))
        );
        assert_ne!(
            StagingArea::cache_key(url, &digest('a')),
            StagingArea::cache_key(url, &digest('b'))
        );
        assert_ne!(
            StagingArea::cache_key(url, &digest('a')),
            StagingArea::cache_key("https://y.test/lm2.004otf.zip", &digest('a'))
        );
    }

    #[rstest]
    #[case("https://x.test/download/lm2.004otf.zip", "lm2.004otf.zip")]
    #[case("https://x.test/f.zip?token=1", "f.zip")]
    #[case("https://x.test/", "artifact")]
    #[case("https://x.test/..", "artifact")]
    #[case("https://x.test/a%20b.otf", "a_20b.otf")]
    fn staged_file_names_are_safe(#[case] url: &str, #[case] expected: &str) {
        assert_eq!(staged_file_name(url), expected);
    }

    #[test]
    fn artifact_path_lives_under_key_dir() {
        let (_temp, area) = staging();
        let path = area
            .artifact_path("https://x.test/f.zip", &digest('a'))
            .expect("path");
        assert!(path.starts_with(area.root()));
        assert!(path.parent().is_some_and(|p| p.exists()));
        assert_eq!(path.file_name(), Some("f.zip"));
    }

    #[test]
    fn expansion_dirs_are_fresh_and_removed_on_drop() {
        let (_temp, area) = staging();
        let first = area.expansion_dir("key").expect("dir");
        let second = area.expansion_dir("key").expect("dir");
        assert_ne!(first.path(), second.path());
        let path = first.path().to_path_buf();
        drop(first);
        assert!(!path.exists());
    }

    #[test]
    fn discard_stale_empties_root() {
        let (_temp, area) = staging();
        let staged = area
            .artifact_path("https://x.test/f.zip", &digest('a'))
            .expect("path");
        std::fs::write(&staged, b"bytes").expect("write");
        std::fs::write(area.root().join("stray.part"), b"x").expect("write");

        assert_eq!(area.discard_stale().expect("discard"), 2);
        assert_eq!(std::fs::read_dir(area.root()).expect("list").count(), 0);
    }

    #[test]
    fn lock_is_exclusive_and_kept_by_discard() {
        let (_temp, area) = staging();
        let held = area.lock().expect("lock");
        std::fs::create_dir_all(area.key_dir("0123456789abcdef")).expect("stale entry");

        assert_eq!(area.discard_stale().expect("discard"), 1);

        let other = File::open(area.root().join(LOCK_FILE_NAME)).expect("lock file kept");
        assert!(other.try_lock_exclusive().is_err(), "lock must be exclusive");
        drop(held);
        other.try_lock_exclusive().expect("lock released on drop");
    }

    #[test]
    fn discard_stale_tolerates_missing_root() {
        let (_temp, area) = staging();
        assert_eq!(area.discard_stale().expect("discard"), 0);
    }
}

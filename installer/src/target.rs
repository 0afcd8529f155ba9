//! Install locations and transactional file placement.
//!
//! [`Placement`] journals every change it makes to the target directories so
//! that a failed install can be undone. Existing files owned by the version
//! being replaced are renamed aside rather than deleted, and only removed
//! once the new record has been written.

use crate::atomic::{Replace, write_atomically};
use crate::manifest::{ResourceDeclaration, ResourceKind};
use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, trace, warn};
use std::fs::{self, File};
use std::io;

/// Suffix of the hidden sibling a displaced file is renamed to.
const BACKUP_SUFFIX: &str = ".caskwright-old";

/// Errors raised while changing the target directories.
#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    /// A file already exists at a destination and is not owned by the
    /// manifest being installed.
    #[error("refusing to overwrite {path}: file is not managed by this manifest")]
    Conflict {
        /// The occupied destination.
        path: Utf8PathBuf,
    },

    /// A filesystem operation failed.
    #[error("failed to update {path}: {source}")]
    Io {
        /// The path being changed.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

impl TargetError {
    fn io(path: &Utf8Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Directories that receive installed resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetLayout {
    /// Destination for [`ResourceKind::Font`] resources.
    pub fonts_dir: Utf8PathBuf,
    /// Destination for [`ResourceKind::File`] resources.
    pub files_dir: Utf8PathBuf,
}

impl TargetLayout {
    /// Create a layout from explicit directories.
    #[must_use]
    pub fn new(fonts_dir: Utf8PathBuf, files_dir: Utf8PathBuf) -> Self {
        Self {
            fonts_dir,
            files_dir,
        }
    }

    /// Return the directory for a resource kind.
    #[must_use]
    pub fn dir_for(&self, kind: ResourceKind) -> &Utf8Path {
        match kind {
            ResourceKind::Font => &self.fonts_dir,
            ResourceKind::File => &self.files_dir,
        }
    }

    /// Return where a declared resource is installed.
    ///
    /// # Examples
    ///
    /// ```
    /// use caskwright_installer::manifest::ResourceDeclaration;
    /// use caskwright_installer::target::TargetLayout;
    ///
    /// let layout = TargetLayout::new("/fonts".into(), "/files".into());
    /// let font = ResourceDeclaration::font("otf/lmroman10-regular.otf").expect("valid resource");
    /// assert_eq!(layout.destination(&font), "/fonts/lmroman10-regular.otf");
    /// ```
    #[must_use]
    pub fn destination(&self, resource: &ResourceDeclaration) -> Utf8PathBuf {
        self.dir_for(resource.kind()).join(resource.file_name())
    }
}

#[derive(Debug)]
enum Change {
    Placed(Utf8PathBuf),
    Displaced {
        original: Utf8PathBuf,
        backup: Utf8PathBuf,
    },
}

/// Journal of target changes made by one install or upgrade.
///
/// Dropping a placement without calling [`Placement::commit`] or
/// [`Placement::rollback`] leaves the changes and backups in place.
#[derive(Debug, Default)]
pub struct Placement {
    changes: Vec<Change>,
}

impl Placement {
    /// Start an empty journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rename an installed file aside so its destination can be reused.
    ///
    /// Returns `false` when the file no longer exists.
    ///
    /// # Errors
    ///
    /// Returns [`TargetError::Io`] when the rename fails.
    pub fn displace(&mut self, path: &Utf8Path) -> Result<bool, TargetError> {
        if !path.exists() {
            warn!("previously installed file {path} is already gone");
            return Ok(false);
        }
        let backup = backup_path(path);
        fs::rename(path, &backup).map_err(|err| TargetError::io(path, err))?;
        debug!("displaced {path}");
        self.changes.push(Change::Displaced {
            original: path.to_path_buf(),
            backup,
        });
        Ok(true)
    }

    /// Copy `source` to `dest` through a temporary sibling.
    ///
    /// # Errors
    ///
    /// Returns [`TargetError::Conflict`] when `dest` already exists and
    /// [`TargetError::Io`] when the copy fails.
    pub fn place(&mut self, source: &Utf8Path, dest: &Utf8Path) -> Result<(), TargetError> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|err| TargetError::io(parent, err))?;
        }
        write_atomically(dest.as_std_path(), Replace::Forbid, |file| {
            io::copy(&mut File::open(source)?, file).map(|_| ())
        })
        .map_err(|err| match err.kind() {
            io::ErrorKind::AlreadyExists => TargetError::Conflict {
                path: dest.to_path_buf(),
            },
            _ => TargetError::io(dest, err),
        })?;
        trace!("placed {dest}");
        self.changes.push(Change::Placed(dest.to_path_buf()));
        Ok(())
    }

    /// Return the files placed so far, in placement order.
    #[must_use]
    pub fn placed(&self) -> Vec<Utf8PathBuf> {
        self.changes
            .iter()
            .filter_map(|change| match change {
                Change::Placed(path) => Some(path.clone()),
                Change::Displaced { .. } => None,
            })
            .collect()
    }

    /// Undo every change in reverse order.
    ///
    /// Undo is best effort: each failure is logged and returned, and the
    /// remaining changes are still undone. A displaced file is never restored
    /// over a file that has since appeared at its original path; its backup
    /// is kept and a [`TargetError::Conflict`] is returned instead.
    pub fn rollback(mut self) -> Vec<TargetError> {
        let mut failures = Vec::new();
        while let Some(change) = self.changes.pop() {
            let result = match &change {
                Change::Placed(path) => {
                    fs::remove_file(path).map_err(|e| TargetError::io(path, e))
                }
                Change::Displaced { original, backup } => restore(original, backup),
            };
            if let Err(err) = result {
                warn!("rollback incomplete: {err}");
                failures.push(err);
            }
        }
        failures
    }

    /// Make the changes permanent by deleting displaced backups.
    pub fn commit(self) {
        for change in self.changes {
            if let Change::Displaced { backup, .. } = change {
                if let Err(err) = fs::remove_file(&backup) {
                    warn!("could not remove backup {backup}: {err}");
                }
            }
        }
    }
}

/// Delete an installed file. Returns `false` when it was already missing.
///
/// # Errors
///
/// Returns [`TargetError::Io`] for failures other than "not found".
pub fn remove_installed(path: &Utf8Path) -> Result<bool, TargetError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(TargetError::io(path, err)),
    }
}

/// Move `backup` back to `original` without replacing anything there.
fn restore(original: &Utf8Path, backup: &Utf8Path) -> Result<(), TargetError> {
    let claimed = || {
        warn!("{original} was claimed while displaced; keeping {backup}");
        TargetError::Conflict {
            path: original.to_path_buf(),
        }
    };
    match fs::hard_link(backup, original) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => return Err(claimed()),
        Err(err) => {
            debug!("cannot hard link {backup} ({err}); renaming instead");
            if fs::symlink_metadata(original).is_ok() {
                return Err(claimed());
            }
            return fs::rename(backup, original).map_err(|e| TargetError::io(original, e));
        }
    }
    fs::remove_file(backup).map_err(|err| TargetError::io(backup, err))
}

fn backup_path(path: &Utf8Path) -> Utf8PathBuf {
    let name = path.file_name().unwrap_or("resource");
    path.with_file_name(format!(".{name}{BACKUP_SUFFIX}"))
}

//! Write-new-then-rename file replacement.
//!
//! Every durable write in the installer (staged downloads, placed resources,
//! state records) goes through [`write_atomically`]: content is written to a
//! temporary sibling, flushed to disk, and renamed over the destination. A
//! reader therefore observes either the old file or the complete new one.

use log::debug;
use std::fs::File;
use std::io;
use std::path::Path;

/// Prefix shared by every temporary file this module creates.
pub const TEMP_PREFIX: &str = ".caskwright-";

/// Suffix shared by every temporary file this module creates.
pub const TEMP_SUFFIX: &str = ".part";

/// Whether an existing destination may be replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Replace {
    /// Rename over any existing file.
    Allow,
    /// Fail with [`io::ErrorKind::AlreadyExists`] if the destination exists.
    Forbid,
}

/// Write `dest` through a temporary sibling file.
///
/// `write` receives the open temporary file. When it fails, or the final
/// rename fails, the temporary file is removed and `dest` is untouched.
///
/// # Errors
///
/// Returns the error produced by `write`, or an I/O error (converted into
/// `E`) from creating, syncing, or renaming the temporary file.
pub fn write_atomically<E, F>(dest: &Path, replace: Replace, write: F) -> Result<(), E>
where
    E: From<io::Error>,
    F: FnOnce(&mut File) -> Result<(), E>,
{
    let parent = parent_dir(dest);
    let mut temp = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .suffix(TEMP_SUFFIX)
        .tempfile_in(parent)?;
    write(temp.as_file_mut())?;
    temp.as_file().sync_all()?;
    match replace {
        Replace::Allow => temp.persist(dest).map_err(|e| e.error)?,
        Replace::Forbid => temp.persist_noclobber(dest).map_err(|e| e.error)?,
    };
    sync_dir(parent);
    Ok(())
}

/// Return `true` when `name` looks like a temporary file left behind by an
/// interrupted [`write_atomically`].
#[must_use]
pub fn is_temp_name(name: &str) -> bool {
    name.starts_with(TEMP_PREFIX) && name.ends_with(TEMP_SUFFIX)
}

fn parent_dir(dest: &Path) -> &Path {
    dest.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Flush directory metadata so the rename itself survives a crash.
pub(crate) fn sync_dir(dir: &Path) {
    #[cfg(unix)]
    {
        if let Err(err) = File::open(dir).and_then(|d| d.sync_all()) {
            debug!("could not sync directory {}: {err}", dir.display());
        }
    }
    #[cfg(not(unix))]
    {
        debug!("skipping directory sync for {}", dir.display());
    }
}

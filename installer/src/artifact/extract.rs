//! Archive expansion with path traversal protection.
//!
//! Expansion runs in two passes. The first walks every member name and
//! rejects the whole archive if any of them would escape the destination,
//! so a malicious archive leaves nothing behind. The second pass writes
//! regular files and records where each member landed.

use super::members::MemberMap;
use crate::manifest::ArchiveKind;
use camino::{Utf8Path, Utf8PathBuf};
use log::debug;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};

/// Mode bits identifying a symlink in a zip entry's Unix attributes.
const S_IFLNK: u32 = 0o120_000;
/// Mask for the file type portion of a Unix mode.
const S_IFMT: u32 = 0o170_000;

/// Trait for expanding staged artifacts, enabling test mocking.
///
/// # Examples
///
/// ```
/// use caskwright_installer::artifact::extract::StandardExpander;
///
/// let expander = StandardExpander;
/// // Use expander.expand(staged, kind, dest) in production
/// ```
#[cfg_attr(test, mockall::automock)]
pub trait ArchiveExpander: Send + Sync {
    /// Expand `staged` (of the given `kind`) into `dest`.
    ///
    /// Returns the member map of extracted regular files.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError::PathTraversal`] before writing anything
    /// if any member escapes `dest`, [`ExtractionError::EmptyArchive`] when
    /// there are no regular files, and I/O or format errors otherwise.
    fn expand(
        &self,
        staged: &Utf8Path,
        kind: ArchiveKind,
        dest: &Utf8Path,
    ) -> Result<MemberMap, ExtractionError>;
}

/// Errors arising from archive expansion.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    /// I/O error during expansion.
    #[error("extraction I/O error: {0}")]
    Io(#[from] io::Error),

    /// The zip container is malformed.
    #[error("invalid zip archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// A member name attempts to escape the destination.
    #[error("path traversal detected: {path}")]
    PathTraversal {
        /// The offending member name.
        path: String,
    },

    /// A member name is not valid UTF-8.
    #[error("archive member name is not valid UTF-8: {name}")]
    NonUtf8Name {
        /// Lossy rendering of the name.
        name: String,
    },

    /// The archive contains no regular files.
    #[error("archive contains no files")]
    EmptyArchive,
}

/// Expander supporting zip, tar, tar.gz and tar.zst.
pub struct StandardExpander;

impl ArchiveExpander for StandardExpander {
    fn expand(
        &self,
        staged: &Utf8Path,
        kind: ArchiveKind,
        dest: &Utf8Path,
    ) -> Result<MemberMap, ExtractionError> {
        debug!("expanding {staged} as {} into {dest}", kind.as_str());
        let members = match kind {
            ArchiveKind::None => expand_plain(staged)?,
            ArchiveKind::Zip => expand_zip(staged, dest)?,
            ArchiveKind::Tar | ArchiveKind::TarGz | ArchiveKind::TarZst => {
                expand_tar(staged, kind, dest)?
            }
        };
        if members.is_empty() {
            return Err(ExtractionError::EmptyArchive);
        }
        debug!("expanded {} member(s) from {staged}", members.len());
        Ok(members)
    }
}

/// Map a non-archive artifact under its own file name.
fn expand_plain(staged: &Utf8Path) -> Result<MemberMap, ExtractionError> {
    let mut members = MemberMap::new();
    if let Some(name) = staged.file_name() {
        members.insert(name, staged.to_path_buf());
    }
    Ok(members)
}

fn expand_zip(staged: &Utf8Path, dest: &Utf8Path) -> Result<MemberMap, ExtractionError> {
    let mut archive = zip::ZipArchive::new(BufReader::new(File::open(staged)?))?;

    let mut planned = Vec::new();
    for index in 0..archive.len() {
        let entry = archive.by_index(index)?;
        let Some(member) = member_name(entry.name())? else {
            continue;
        };
        if entry.is_dir() {
            continue;
        }
        if entry.unix_mode().is_some_and(|mode| mode & S_IFMT == S_IFLNK) {
            debug!("skipping symlink member {member}");
            continue;
        }
        planned.push((index, member));
    }

    let mut members = MemberMap::new();
    for (index, member) in planned {
        let mut entry = archive.by_index(index)?;
        let target = write_member(dest, &member, &mut entry)?;
        members.insert(member, target);
    }
    Ok(members)
}

fn expand_tar(
    staged: &Utf8Path,
    kind: ArchiveKind,
    dest: &Utf8Path,
) -> Result<MemberMap, ExtractionError> {
    let mut archive = open_tar(staged, kind)?;
    for entry in archive.entries()? {
        let entry = entry?;
        member_name(&tar_name(&entry)?)?;
    }

    let mut archive = open_tar(staged, kind)?;
    let mut members = MemberMap::new();
    for entry in archive.entries()? {
        let mut entry = entry?;
        let Some(member) = member_name(&tar_name(&entry)?)? else {
            continue;
        };
        let entry_type = entry.header().entry_type();
        if entry_type.is_symlink() || entry_type.is_hard_link() {
            debug!("skipping link member {member}");
            continue;
        }
        if !entry_type.is_file() {
            continue;
        }
        let target = write_member(dest, &member, &mut entry)?;
        members.insert(member, target);
    }
    Ok(members)
}

fn open_tar(staged: &Utf8Path, kind: ArchiveKind) -> io::Result<tar::Archive<Box<dyn Read>>> {
    let file = File::open(staged)?;
    let reader: Box<dyn Read> = match kind {
        ArchiveKind::TarGz => Box::new(flate2::read::GzDecoder::new(BufReader::new(file))),
        ArchiveKind::TarZst => Box::new(zstd::Decoder::new(file)?),
        _ => Box::new(BufReader::new(file)),
    };
    Ok(tar::Archive::new(reader))
}

fn tar_name<R: Read>(entry: &tar::Entry<'_, R>) -> Result<String, ExtractionError> {
    let bytes = entry.path_bytes();
    String::from_utf8(bytes.to_vec()).map_err(|_| ExtractionError::NonUtf8Name {
        name: String::from_utf8_lossy(&bytes).into_owned(),
    })
}

/// Copy one member's bytes to its place below `dest`.
fn write_member(
    dest: &Utf8Path,
    member: &str,
    reader: &mut impl Read,
) -> Result<Utf8PathBuf, ExtractionError> {
    let target = dest.join(member);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(&target)?;
    io::copy(reader, &mut file)?;
    Ok(target)
}

/// Normalise and validate a raw member name.
///
/// Returns `None` for names that denote the archive root (such as `./`).
/// Backslashes are treated as separators so that archives produced on
/// Windows are checked the same way.
fn member_name(raw: &str) -> Result<Option<String>, ExtractionError> {
    let traversal = || ExtractionError::PathTraversal {
        path: raw.to_owned(),
    };
    let name = raw.replace('\\', "/");
    if name.starts_with('/') || has_drive_prefix(&name) {
        return Err(traversal());
    }
    let mut parts = Vec::new();
    for part in name.split('/') {
        match part {
            "" | "." => {}
            ".." => return Err(traversal()),
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        return Ok(None);
    }
    Ok(Some(parts.join("/")))
}

fn has_drive_prefix(name: &str) -> bool {
    matches!(name.as_bytes(), [letter, b':', ..] if letter.is_ascii_alphabetic())
}

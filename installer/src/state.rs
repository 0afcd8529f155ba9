//! Durable installed-state records.
//!
//! Each installed manifest has one JSON record at
//! `<state_dir>/records/<id>.json`. Records are replaced atomically, so an
//! interrupted write leaves either the previous record or the new one. A
//! record that exists but cannot be parsed is reported, never ignored.

use crate::atomic::{self, Replace, write_atomically};
use crate::manifest::{ManifestId, Version};
use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::time::{SystemTime, UNIX_EPOCH};

const RECORDS_DIRNAME: &str = "records";
const RECORD_EXTENSION: &str = "json";

/// Moment a record was written, in seconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstalledAt(u64);

impl InstalledAt {
    /// Capture the current wall-clock time. Clocks set before 1970 read as
    /// zero.
    #[must_use]
    pub fn now() -> Self {
        let seconds = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_secs());
        Self(seconds)
    }

    /// Wrap an explicit timestamp.
    #[must_use]
    pub const fn from_unix_seconds(seconds: u64) -> Self {
        Self(seconds)
    }

    /// Return the timestamp in seconds since the Unix epoch.
    #[must_use]
    pub const fn unix_seconds(self) -> u64 {
        self.0
    }
}

/// Proof that a manifest version was installed, and which files it owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstalledRecord {
    /// Identifier of the installed manifest.
    pub id: ManifestId,
    /// Version that was installed.
    pub version: Version,
    /// Absolute paths of every installed file.
    pub files: Vec<Utf8PathBuf>,
    /// When the install completed.
    pub installed_at: InstalledAt,
}

/// Snapshot of every record, keyed by identifier.
pub type InstalledRecords = BTreeMap<ManifestId, InstalledRecord>;

/// Errors raised by the state store.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// The records directory could not be created.
    #[error("failed to create state directory {path}: {source}")]
    CreateDirectory {
        /// Directory that could not be created.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A record or the records directory could not be read.
    #[error("failed to read state record {path}: {source}")]
    Read {
        /// Path that could not be read.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A record exists but does not parse.
    #[error("state record {path} is corrupt: {source}")]
    Corrupt {
        /// The unreadable record.
        path: Utf8PathBuf,
        /// Parse failure.
        #[source]
        source: serde_json::Error,
    },

    /// A record's content names a different identifier than its file.
    #[error("state record {path} belongs to {found}")]
    Misfiled {
        /// The record file.
        path: Utf8PathBuf,
        /// Identifier stored inside the record.
        found: ManifestId,
    },

    /// A record could not be serialised.
    #[error("failed to serialise state record: {source}")]
    Serialize {
        /// Serialisation failure.
        #[source]
        source: serde_json::Error,
    },

    /// A record could not be written.
    #[error("failed to write state record {path}: {source}")]
    Write {
        /// Destination record file.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A record could not be deleted.
    #[error("failed to delete state record {path}: {source}")]
    Delete {
        /// Record file that could not be removed.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// Storage seam used by the executor.
#[cfg_attr(test, mockall::automock)]
pub trait RecordStore: Send + Sync {
    /// Return the record for `id`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] when the record exists but cannot be read or
    /// parsed.
    fn get(&self, id: &ManifestId) -> Result<Option<InstalledRecord>, StateError>;

    /// Create or atomically replace the record for `record.id`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] when the record cannot be written.
    fn put(&self, record: &InstalledRecord) -> Result<(), StateError>;

    /// Delete the record for `id`. Deleting an absent record succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Delete`] when the file cannot be removed.
    fn delete(&self, id: &ManifestId) -> Result<(), StateError>;

    /// Return a snapshot of every record keyed by identifier.
    ///
    /// # Errors
    ///
    /// Returns the first read or parse failure encountered.
    fn records(&self) -> Result<InstalledRecords, StateError>;
}

/// Filesystem-backed [`RecordStore`].
///
/// # Examples
///
/// ```no_run
/// use caskwright_installer::state::{RecordStore, StateStore};
/// use camino::Utf8Path;
///
/// let store = StateStore::open(Utf8Path::new("/var/lib/caskwright"))?;
/// for record in store.list()? {
///     println!("{} {}", record.id, record.version);
/// }
/// # Ok::<(), caskwright_installer::state::StateError>(())
/// ```
#[derive(Debug, Clone)]
pub struct StateStore {
    records_dir: Utf8PathBuf,
}

impl StateStore {
    /// Open (creating if needed) the store below `state_dir`, removing
    /// temporary files left by an interrupted write.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::CreateDirectory`] or [`StateError::Read`] when
    /// the records directory is unusable.
    pub fn open(state_dir: &Utf8Path) -> Result<Self, StateError> {
        let records_dir = state_dir.join(RECORDS_DIRNAME);
        fs::create_dir_all(&records_dir).map_err(|source| StateError::CreateDirectory {
            path: records_dir.clone(),
            source,
        })?;
        let store = Self { records_dir };
        store.remove_leftovers()?;
        Ok(store)
    }

    /// Return the directory holding record files.
    #[must_use]
    pub fn records_dir(&self) -> &Utf8Path {
        &self.records_dir
    }

    /// Return every record, sorted by identifier.
    ///
    /// # Errors
    ///
    /// Returns the first read or parse failure encountered.
    pub fn list(&self) -> Result<Vec<InstalledRecord>, StateError> {
        Ok(RecordStore::records(self)?.into_values().collect())
    }

    fn record_path(&self, id: &ManifestId) -> Utf8PathBuf {
        self.records_dir
            .join(format!("{}.{RECORD_EXTENSION}", id.as_str()))
    }

    fn record_files(&self) -> Result<Vec<Utf8PathBuf>, StateError> {
        let read_error = |source| StateError::Read {
            path: self.records_dir.clone(),
            source,
        };
        let mut files = Vec::new();
        for entry in self.records_dir.read_dir_utf8().map_err(read_error)? {
            let entry = entry.map_err(read_error)?;
            let path = entry.path();
            if path.extension() == Some(RECORD_EXTENSION) && !atomic::is_temp_name(entry.file_name())
            {
                files.push(path.to_path_buf());
            }
        }
        files.sort();
        Ok(files)
    }

    fn remove_leftovers(&self) -> Result<(), StateError> {
        let entries = self
            .records_dir
            .read_dir_utf8()
            .map_err(|source| StateError::Read {
                path: self.records_dir.clone(),
                source,
            })?;
        for entry in entries.flatten() {
            if atomic::is_temp_name(entry.file_name()) {
                debug!("removing interrupted state write {}", entry.path());
                if let Err(err) = fs::remove_file(entry.path()) {
                    warn!("could not remove {}: {err}", entry.path());
                }
            }
        }
        Ok(())
    }
}

impl RecordStore for StateStore {
    fn get(&self, id: &ManifestId) -> Result<Option<InstalledRecord>, StateError> {
        let path = self.record_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let record = read_record(&path)?;
        if &record.id != id {
            return Err(StateError::Misfiled {
                path,
                found: record.id,
            });
        }
        Ok(Some(record))
    }

    fn put(&self, record: &InstalledRecord) -> Result<(), StateError> {
        let path = self.record_path(&record.id);
        let json = serde_json::to_string_pretty(record)
            .map_err(|source| StateError::Serialize { source })?;
        write_atomically(path.as_std_path(), Replace::Allow, |file| {
            file.write_all(json.as_bytes())?;
            file.write_all(b"\n")
        })
        .map_err(|source| StateError::Write {
            path: path.clone(),
            source,
        })?;
        debug!("recorded {} {}", record.id, record.version);
        Ok(())
    }

    fn delete(&self, id: &ManifestId) -> Result<(), StateError> {
        let path = self.record_path(id);
        match fs::remove_file(&path) {
            Ok(()) => {
                atomic::sync_dir(self.records_dir.as_std_path());
                debug!("deleted record for {id}");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StateError::Delete { path, source }),
        }
    }

    fn records(&self) -> Result<InstalledRecords, StateError> {
        let mut records = InstalledRecords::new();
        for path in self.record_files()? {
            let record = read_record(&path)?;
            if path.file_stem() != Some(record.id.as_str()) {
                return Err(StateError::Misfiled {
                    path,
                    found: record.id,
                });
            }
            records.insert(record.id.clone(), record);
        }
        Ok(records)
    }
}

fn read_record(path: &Utf8Path) -> Result<InstalledRecord, StateError> {
    let content = fs::read_to_string(path).map_err(|source| StateError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| StateError::Corrupt {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;

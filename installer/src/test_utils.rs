//! Shared test utilities for the installer crate.
//!
//! Available to unit tests and, through the `test-support` feature, to the
//! integration suites under `tests/`.
#![expect(
    clippy::expect_used,
    clippy::missing_panics_doc,
    reason = "test helpers fail fast on broken fixtures"
)]

use crate::artifact::fetch::{ArtifactFetcher, FetchError};
use crate::artifact::staging::StagingArea;
use crate::atomic::{Replace, write_atomically};
use crate::hooks::{CommandExecutor, HookError, PostInstallHook};
use crate::manifest::{
    ArchiveKind, ArtifactSpec, Manifest, ManifestId, ManifestParts, ResourceDeclaration,
    Sha256Digest, Version,
};
use crate::state::{
    InstalledAt, InstalledRecord, InstalledRecords, RecordStore, StateError, StateStore,
};
use crate::target::TargetLayout;
use camino::Utf8PathBuf;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::io::{self, Cursor, Write};
use std::path::Path;
use std::process::{ExitStatus, Output};
use std::sync::atomic::{AtomicU32, Ordering};
use tempfile::TempDir;

// -------------------------------------------------------------------------
// Command execution
// -------------------------------------------------------------------------

/// Creates an `ExitStatus` from an exit code (Unix implementation).
#[cfg(unix)]
#[must_use]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;

    ExitStatus::from_raw(code << 8)
}

/// Creates an `ExitStatus` from an exit code (Windows implementation).
#[cfg(windows)]
#[must_use]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::windows::process::ExitStatusExt;

    ExitStatus::from_raw(code.unsigned_abs())
}

/// Creates a successful command `Output` with empty stdout and stderr.
#[must_use]
pub fn success_output() -> Output {
    Output {
        status: exit_status(0),
        stdout: Vec::new(),
        stderr: Vec::new(),
    }
}

/// Creates a failed command `Output` with the given stderr message.
#[must_use]
pub fn failure_output(stderr: &str) -> Output {
    Output {
        status: exit_status(1),
        stdout: Vec::new(),
        stderr: stderr.as_bytes().to_vec(),
    }
}

/// Represents an expected command invocation for testing.
#[derive(Debug)]
pub struct ExpectedCall {
    /// The command to execute (e.g., "fc-cache").
    pub cmd: &'static str,
    /// The arguments to pass to the command.
    pub args: Vec<&'static str>,
    /// The result to return when this command is invoked.
    pub result: io::Result<Output>,
}

/// A stub implementation of `CommandExecutor` for testing.
///
/// Records expected command invocations and returns predefined results,
/// allowing tests to verify command execution without side effects.
#[derive(Debug)]
pub struct StubExecutor {
    expected: Mutex<VecDeque<ExpectedCall>>,
}

impl StubExecutor {
    /// Creates a new `StubExecutor` with the given expected calls.
    #[must_use]
    pub fn new(expected: Vec<ExpectedCall>) -> Self {
        Self {
            expected: Mutex::new(expected.into()),
        }
    }

    /// Asserts that all expected command invocations have been consumed.
    ///
    /// # Panics
    ///
    /// Panics if there are remaining expected calls that were not invoked.
    pub fn assert_finished(&self) {
        assert!(
            self.expected.lock().is_empty(),
            "expected no further command invocations"
        );
    }
}

impl CommandExecutor for StubExecutor {
    fn run(&self, cmd: &str, args: &[&str]) -> io::Result<Output> {
        let call = self
            .expected
            .lock()
            .pop_front()
            .expect("unexpected command invocation");

        assert_eq!(call.cmd, cmd);
        assert_eq!(call.args.as_slice(), args);

        call.result
    }
}

// -------------------------------------------------------------------------
// Archive builders
// -------------------------------------------------------------------------

/// Returns the lowercase hex SHA-256 of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Returns the digest of `bytes` as a [`Sha256Digest`].
#[must_use]
pub fn digest_of(bytes: &[u8]) -> Sha256Digest {
    Sha256Digest::from_bytes(&Sha256::digest(bytes).into())
}

/// Builds a zip archive holding `entries` of `(member name, content)`.
#[must_use]
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    build_zip(|writer, options| {
        for (name, content) in entries {
            writer.start_file(*name, options).expect("start zip entry");
            writer.write_all(content).expect("write zip entry");
        }
    })
}

/// Builds a zip archive holding `entries` plus a symlink member.
#[must_use]
pub fn zip_with_symlink(link: &str, target: &str, entries: &[(&str, &[u8])]) -> Vec<u8> {
    build_zip(|writer, options| {
        writer
            .add_symlink(link, target, options)
            .expect("add zip symlink");
        for (name, content) in entries {
            writer.start_file(*name, options).expect("start zip entry");
            writer.write_all(content).expect("write zip entry");
        }
    })
}

fn build_zip(
    fill: impl FnOnce(&mut zip::ZipWriter<Cursor<Vec<u8>>>, zip::write::SimpleFileOptions),
) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    fill(&mut writer, zip::write::SimpleFileOptions::default());
    writer.finish().expect("finish zip").into_inner()
}

/// Builds an uncompressed tar archive holding `entries`.
#[must_use]
pub fn tar_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    append_tar_files(&mut builder, entries);
    builder.into_inner().expect("finish tar")
}

/// Builds a tar archive whose single member name is written verbatim into
/// the header, bypassing the builder's path checks.
///
/// # Panics
///
/// Panics if `name` does not fit the 100-byte header field.
#[must_use]
pub fn tar_bytes_with_raw_name(name: &str, content: &[u8]) -> Vec<u8> {
    let mut header = tar::Header::new_gnu();
    let raw = name.as_bytes();
    header
        .as_old_mut()
        .name
        .get_mut(..raw.len())
        .expect("name fits tar header")
        .copy_from_slice(raw);
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_entry_type(tar::EntryType::Regular);
    header.set_cksum();

    let mut builder = tar::Builder::new(Vec::new());
    builder.append(&header, content).expect("append raw entry");
    builder.into_inner().expect("finish tar")
}

/// Builds a tar archive holding `entries` plus a symlink member.
#[must_use]
pub fn tar_with_symlink(link: &str, target: &str, entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Symlink);
    header.set_size(0);
    header.set_mode(0o777);
    builder
        .append_link(&mut header, link, target)
        .expect("append symlink");
    append_tar_files(&mut builder, entries);
    builder.into_inner().expect("finish tar")
}

/// Builds a gzip-compressed tar archive holding `entries`.
#[must_use]
pub fn tar_gz_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut encoder =
        flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder
        .write_all(&tar_bytes(entries))
        .expect("gzip tar");
    encoder.finish().expect("finish gzip")
}

/// Builds a zstd-compressed tar archive holding `entries`.
#[must_use]
pub fn tar_zst_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    zstd::encode_all(tar_bytes(entries).as_slice(), 0).expect("zstd tar")
}

fn append_tar_files(builder: &mut tar::Builder<Vec<u8>>, entries: &[(&str, &[u8])]) {
    for (name, content) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(tar::EntryType::Regular);
        builder
            .append_data(&mut header, name, *content)
            .expect("append tar entry");
    }
}

// -------------------------------------------------------------------------
// Manifests and records
// -------------------------------------------------------------------------

/// A manifest together with the artifact bytes it describes.
#[derive(Debug, Clone)]
pub struct FontBundle {
    /// The manifest, whose digest matches `bytes`.
    pub manifest: Manifest,
    /// Download URL of the artifact for the manifest's version.
    pub url: String,
    /// Zip archive containing one member per font.
    pub bytes: Vec<u8>,
}

/// Builds a zip artifact holding `fonts` under an `otf/` directory and a
/// manifest declaring each of them as a font resource.
///
/// Font contents embed the version so upgrades change file contents.
#[must_use]
pub fn font_bundle(id: &str, version: &str, fonts: &[&str]) -> FontBundle {
    let contents: Vec<(String, Vec<u8>)> = fonts
        .iter()
        .map(|font| (format!("otf/{font}"), format!("{font} {version}").into_bytes()))
        .collect();
    let entries: Vec<(&str, &[u8])> = contents
        .iter()
        .map(|(name, content)| (name.as_str(), content.as_slice()))
        .collect();
    let bytes = zip_bytes(&entries);
    let resources = fonts
        .iter()
        .map(|font| ResourceDeclaration::font(*font).expect("valid font resource"))
        .collect();
    let template = format!("https://downloads.example.test/{id}/{{version}}.zip");
    let manifest = manifest_with(id, version, &template, &bytes, ArchiveKind::Zip, resources);
    let url = format!("https://downloads.example.test/{id}/{version}.zip");
    FontBundle {
        manifest,
        url,
        bytes,
    }
}

/// Builds a font manifest; the digest matches [`font_bundle`]'s artifact.
#[must_use]
pub fn font_manifest(id: &str, version: &str, fonts: &[&str]) -> Manifest {
    font_bundle(id, version, fonts).manifest
}

/// Builds a single-artifact manifest whose digest matches `bytes`.
#[must_use]
pub fn manifest_with(
    id: &str,
    version: &str,
    url_template: &str,
    bytes: &[u8],
    archive: ArchiveKind,
    resources: Vec<ResourceDeclaration>,
) -> Manifest {
    Manifest::new(ManifestParts {
        id: ManifestId::try_from(id).expect("valid id"),
        version: Version::try_from(version).expect("valid version"),
        name: None,
        homepage: None,
        license: None,
        artifacts: vec![ArtifactSpec {
            url: url_template.try_into().expect("valid URL template"),
            sha256: digest_of(bytes),
            archive: Some(archive),
        }],
        resources,
    })
    .expect("valid manifest")
}

/// Builds an installed record with the given files.
#[must_use]
pub fn installed_record(id: &str, version: &str, files: &[&str]) -> InstalledRecord {
    InstalledRecord {
        id: ManifestId::try_from(id).expect("valid id"),
        version: Version::try_from(version).expect("valid version"),
        files: files.iter().map(Utf8PathBuf::from).collect(),
        installed_at: InstalledAt::from_unix_seconds(1_700_000_000),
    }
}

// -------------------------------------------------------------------------
// Collaborator doubles
// -------------------------------------------------------------------------

/// Canned response for [`StaticFetcher`].
#[derive(Debug, Clone)]
pub enum Served {
    /// Respond with these bytes.
    Bytes(Vec<u8>),
    /// Respond with this HTTP status.
    Status(u16),
    /// Fail at the transport level.
    Offline,
}

/// In-memory [`ArtifactFetcher`] serving canned responses by URL.
///
/// Unknown URLs answer with HTTP 404.
#[derive(Debug, Default)]
pub struct StaticFetcher {
    responses: Mutex<HashMap<String, Served>>,
    calls: Mutex<Vec<String>>,
}

impl StaticFetcher {
    /// Creates a fetcher with no responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the response for `url`.
    pub fn serve(&self, url: impl Into<String>, response: Served) {
        self.responses.lock().insert(url.into(), response);
    }

    /// Returns every URL requested so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

impl ArtifactFetcher for StaticFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
        self.calls.lock().push(url.to_owned());
        let response = self.responses.lock().get(url).cloned();
        match response {
            Some(Served::Bytes(bytes)) => write_atomically(dest, Replace::Allow, |file| {
                file.write_all(&bytes)?;
                Ok(())
            }),
            Some(Served::Status(status)) => Err(FetchError::HttpStatus {
                url: url.to_owned(),
                status,
            }),
            Some(Served::Offline) => Err(FetchError::Network {
                url: url.to_owned(),
                reason: "connection refused".to_owned(),
            }),
            None => Err(FetchError::HttpStatus {
                url: url.to_owned(),
                status: 404,
            }),
        }
    }
}

/// [`RecordStore`] wrapper that fails a set number of writes or deletes.
#[derive(Debug)]
pub struct FlakyStore {
    inner: StateStore,
    put_failures: AtomicU32,
    delete_failures: AtomicU32,
    put_attempts: AtomicU32,
}

impl FlakyStore {
    /// Wraps `inner` with no failures scheduled.
    #[must_use]
    pub fn new(inner: StateStore) -> Self {
        Self {
            inner,
            put_failures: AtomicU32::new(0),
            delete_failures: AtomicU32::new(0),
            put_attempts: AtomicU32::new(0),
        }
    }

    /// Makes the next `count` writes fail.
    pub fn fail_puts(&self, count: u32) {
        self.put_failures.store(count, Ordering::SeqCst);
    }

    /// Makes the next `count` deletes fail.
    pub fn fail_deletes(&self, count: u32) {
        self.delete_failures.store(count, Ordering::SeqCst);
    }

    /// Returns how many writes were attempted.
    #[must_use]
    pub fn put_attempts(&self) -> u32 {
        self.put_attempts.load(Ordering::SeqCst)
    }

    /// Returns the wrapped store.
    #[must_use]
    pub fn inner(&self) -> &StateStore {
        &self.inner
    }
}

fn take_failure(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

fn injected(id: &ManifestId) -> io::Error {
    io::Error::other(format!("injected failure for {id}"))
}

impl RecordStore for FlakyStore {
    fn get(&self, id: &ManifestId) -> Result<Option<InstalledRecord>, StateError> {
        self.inner.get(id)
    }

    fn put(&self, record: &InstalledRecord) -> Result<(), StateError> {
        self.put_attempts.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.put_failures) {
            return Err(StateError::Write {
                path: self.inner.records_dir().join(record.id.as_str()),
                source: injected(&record.id),
            });
        }
        self.inner.put(record)
    }

    fn delete(&self, id: &ManifestId) -> Result<(), StateError> {
        if take_failure(&self.delete_failures) {
            return Err(StateError::Delete {
                path: self.inner.records_dir().join(id.as_str()),
                source: injected(id),
            });
        }
        self.inner.delete(id)
    }

    fn records(&self) -> Result<InstalledRecords, StateError> {
        self.inner.records()
    }
}

/// [`PostInstallHook`] that records each call and optionally fails.
#[derive(Debug, Default)]
pub struct RecordingHook {
    calls: Mutex<Vec<Vec<Utf8PathBuf>>>,
    fail: bool,
}

impl RecordingHook {
    /// Creates a hook that always succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a hook that always fails.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            calls: Mutex::default(),
            fail: true,
        }
    }

    /// Returns the directory lists passed to each call.
    #[must_use]
    pub fn calls(&self) -> Vec<Vec<Utf8PathBuf>> {
        self.calls.lock().clone()
    }
}

impl PostInstallHook for RecordingHook {
    fn after_change(&self, dirs: &[Utf8PathBuf]) -> Result<(), HookError> {
        self.calls.lock().push(dirs.to_vec());
        if self.fail {
            return Err(HookError::CommandFailed {
                command: "fc-cache -f".to_owned(),
                status: "exit status: 1".to_owned(),
                stderr: "cache locked".to_owned(),
            });
        }
        Ok(())
    }
}

// -------------------------------------------------------------------------
// Sandboxes
// -------------------------------------------------------------------------

/// Temporary directory tree with target, staging and state areas.
#[derive(Debug)]
pub struct Sandbox {
    _temp: TempDir,
    /// Root of the sandbox.
    pub root: Utf8PathBuf,
    /// Target layout below the root.
    pub layout: TargetLayout,
    /// Staging area below the root.
    pub staging: StagingArea,
    /// State directory below the root.
    pub state_dir: Utf8PathBuf,
}

impl Sandbox {
    /// Creates a fresh sandbox.
    ///
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created or is not UTF-8.
    #[must_use]
    pub fn new() -> Self {
        let temp = tempfile::tempdir().expect("temp dir");
        let root = Utf8PathBuf::try_from(temp.path().to_path_buf()).expect("UTF-8 temp dir");
        Self {
            layout: TargetLayout::new(root.join("fonts"), root.join("files")),
            staging: StagingArea::new(root.join("staging")),
            state_dir: root.join("state"),
            root,
            _temp: temp,
        }
    }

    /// Opens the sandbox state store.
    ///
    /// # Panics
    ///
    /// Panics if the store cannot be opened.
    #[must_use]
    pub fn store(&self) -> StateStore {
        StateStore::open(&self.state_dir).expect("open state store")
    }

    /// Returns the sorted names of visible files in the fonts directory.
    #[must_use]
    pub fn installed_fonts(&self) -> Vec<String> {
        let Ok(entries) = self.layout.fonts_dir.read_dir_utf8() else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .map(|entry| entry.expect("dir entry").file_name().to_owned())
            .filter(|name| !name.starts_with('.'))
            .collect();
        names.sort();
        names
    }

    /// Returns the names of every entry in the fonts directory, including
    /// hidden backups and temporary files.
    #[must_use]
    pub fn all_font_dir_entries(&self) -> Vec<String> {
        let Ok(entries) = self.layout.fonts_dir.read_dir_utf8() else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .map(|entry| entry.expect("dir entry").file_name().to_owned())
            .collect();
        names.sort();
        names
    }
}

impl Default for Sandbox {
    fn default() -> Self {
        Self::new()
    }
}

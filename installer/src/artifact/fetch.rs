//! Artifact download.
//!
//! Provides a trait-based abstraction over the HTTP client so that the
//! executor can be exercised without network access. The production
//! implementation streams the response body into a temporary sibling of the
//! destination and renames it into place only after the whole body arrived.

use crate::atomic::{Replace, write_atomically};
use log::debug;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Scheme prefix of URLs served from the local filesystem.
const FILE_SCHEME: &str = "file://";

/// Default network timeout for artifact downloads.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Trait for downloading an artifact into a staging file.
///
/// # Examples
///
/// ```
/// use caskwright_installer::artifact::fetch::HttpFetcher;
///
/// let fetcher = HttpFetcher::default();
/// // Use fetcher.fetch(url, dest) in production
/// ```
#[cfg_attr(test, mockall::automock)]
pub trait ArtifactFetcher: Send + Sync {
    /// Download `url` into `dest`.
    ///
    /// Implementations must never leave a partially written file at `dest`
    /// and must not disturb an existing file there when the download fails.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Network`] on transport failure,
    /// [`FetchError::HttpStatus`] on a non-success status, and
    /// [`FetchError::Io`] when the staging file cannot be written.
    fn fetch(&self, url: &str, dest: &Path) -> Result<(), FetchError>;
}

/// Errors arising from artifact downloads.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The URL could not be parsed into a request.
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl {
        /// The URL that was rejected.
        url: String,
        /// Why the URL is unusable.
        reason: String,
    },

    /// Transport-level failure (DNS, TLS, connection reset, timeout).
    #[error("network error fetching {url}: {reason}")]
    Network {
        /// The URL that was requested.
        url: String,
        /// A human-readable description of the failure.
        reason: String,
    },

    /// The server answered with a non-success status.
    #[error("HTTP status {status} fetching {url}")]
    HttpStatus {
        /// The URL that was requested.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// I/O error writing the staged file.
    #[error("I/O error staging download: {0}")]
    Io(#[from] std::io::Error),
}

/// HTTP downloader using `ureq`, with `file://` support for local mirrors.
pub struct HttpFetcher {
    agent: ureq::Agent,
}

impl HttpFetcher {
    /// Create a fetcher whose requests time out after `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl ArtifactFetcher for HttpFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
        if url.starts_with(FILE_SCHEME) {
            return copy_local(url, &file_url_path(url)?, dest);
        }

        debug!("fetching {url} into {}", dest.display());
        let response = self
            .agent
            .get(url)
            .call()
            .map_err(|e| map_ureq_error(url, &e))?;
        let mut body = response.into_body();
        write_atomically(dest, Replace::Allow, |file| {
            std::io::copy(&mut body.as_reader(), file).map_err(|e| FetchError::Network {
                url: url.to_owned(),
                reason: e.to_string(),
            })?;
            Ok(())
        })
    }
}

/// Serve a `file://` URL by copying through the same atomic path.
fn copy_local(url: &str, source: &Path, dest: &Path) -> Result<(), FetchError> {
    let mut input = std::fs::File::open(source).map_err(|e| FetchError::Network {
        url: url.to_owned(),
        reason: e.to_string(),
    })?;
    write_atomically(dest, Replace::Allow, |file| {
        std::io::copy(&mut input, file)?;
        Ok(())
    })
}

/// Resolve a `file://` URL to a local path.
///
/// The host must be empty or `localhost`. Query and fragment are ignored and
/// the path is percent-decoded.
fn file_url_path(url: &str) -> Result<PathBuf, FetchError> {
    let invalid = |reason: &str| FetchError::InvalidUrl {
        url: url.to_owned(),
        reason: reason.to_owned(),
    };
    let rest = url
        .strip_prefix(FILE_SCHEME)
        .ok_or_else(|| invalid("not a file URL"))?;
    let rest = rest.split(['?', '#']).next().unwrap_or(rest);
    let (host, path) = rest
        .split_once('/')
        .ok_or_else(|| invalid("file URL has no path"))?;
    if !(host.is_empty() || host.eq_ignore_ascii_case("localhost")) {
        return Err(invalid("file URLs must not name a remote host"));
    }
    let decoded = percent_decode(&format!("/{path}"))
        .ok_or_else(|| invalid("malformed percent escape or non-UTF-8 path"))?;
    Ok(platform_path(&decoded))
}

fn percent_decode(path: &str) -> Option<String> {
    let mut bytes = Vec::with_capacity(path.len());
    let mut input = path.bytes();
    while let Some(byte) = input.next() {
        if byte == b'%' {
            let high = hex_value(input.next()?)?;
            let low = hex_value(input.next()?)?;
            bytes.push((high << 4) | low);
        } else {
            bytes.push(byte);
        }
    }
    String::from_utf8(bytes).ok()
}

fn hex_value(byte: u8) -> Option<u8> {
    char::from(byte)
        .to_digit(16)
        .and_then(|digit| u8::try_from(digit).ok())
}

/// `/C:/fonts` names a drive path on Windows.
fn platform_path(decoded: &str) -> PathBuf {
    #[cfg(windows)]
    {
        if let [b'/', drive, b':', ..] = decoded.as_bytes() {
            if drive.is_ascii_alphabetic() {
                return PathBuf::from(decoded.get(1..).unwrap_or(decoded));
            }
        }
    }
    PathBuf::from(decoded)
}

/// Map a ureq error to a [`FetchError`].
fn map_ureq_error(url: &str, err: &ureq::Error) -> FetchError {
    match err {
        ureq::Error::StatusCode(status) => FetchError::HttpStatus {
            url: url.to_owned(),
            status: *status,
        },
        ureq::Error::BadUri(reason) => FetchError::InvalidUrl {
            url: url.to_owned(),
            reason: reason.clone(),
        },
        other => FetchError::Network {
            url: url.to_owned(),
            reason: other.to_string(),
        },
    }
}

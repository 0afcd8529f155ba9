//! Installer configuration.
//!
//! Settings come from an optional `caskwright.toml`. Every key may be
//! omitted; paths that are left unset are filled in from the platform base
//! directories when the configuration is resolved.

use crate::artifact::fetch::DEFAULT_TIMEOUT;
use crate::artifact::staging::StagingArea;
use crate::dirs::BaseDirs;
use crate::executor::RetryPolicy;
use crate::scheduler::default_jobs;
use crate::target::TargetLayout;
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// File name looked up in the configuration directory.
pub const CONFIG_FILE_NAME: &str = "caskwright.toml";

/// Errors raised while loading or resolving configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config {path}")]
    Read {
        /// File that was read.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for [`InstallerConfig`].
    #[error("invalid config {path}")]
    Parse {
        /// File that was parsed.
        path: Utf8PathBuf,
        /// Parser diagnostic.
        #[source]
        source: toml::de::Error,
    },

    /// A directory was left unset and the platform offers no default.
    #[error("cannot determine the {what} directory; set `{key}` in {CONFIG_FILE_NAME}")]
    MissingDirectory {
        /// Human name of the directory.
        what: &'static str,
        /// Configuration key that would supply it.
        key: &'static str,
    },

    /// A platform directory is not valid UTF-8.
    #[error("{what} directory is not valid UTF-8: {}", path.display())]
    NonUtf8Directory {
        /// Human name of the directory.
        what: &'static str,
        /// Offending path.
        path: PathBuf,
    },
}

/// Settings read from `caskwright.toml`.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct InstallerConfig {
    /// Directory fonts are installed into.
    pub target_dir: Option<Utf8PathBuf>,
    /// Directory non-font resources are installed into.
    pub files_dir: Option<Utf8PathBuf>,
    /// Directory holding installed-state records.
    pub state_dir: Option<Utf8PathBuf>,
    /// Directory artifacts are downloaded and expanded in.
    pub staging_dir: Option<Utf8PathBuf>,
    /// Worker count for independent actions.
    pub jobs: Option<usize>,
    /// Transfer timeout for a single artifact download, in seconds.
    pub fetch_timeout_secs: u64,
    /// Attempts made at each state write before giving up.
    pub persistence_retries: u32,
    /// Delay before the second state write attempt, in milliseconds.
    pub retry_backoff_millis: u64,
    /// Whether to refresh the platform font cache after changes.
    pub refresh_font_cache: bool,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            target_dir: None,
            files_dir: None,
            state_dir: None,
            staging_dir: None,
            jobs: None,
            fetch_timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            persistence_retries: 3,
            retry_backoff_millis: 50,
            refresh_font_cache: true,
        }
    }
}

/// Configuration with every directory filled in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedConfig {
    /// Where resources are installed.
    pub layout: TargetLayout,
    /// Root of the staging area.
    pub staging_dir: Utf8PathBuf,
    /// Root of the state store.
    pub state_dir: Utf8PathBuf,
    /// Worker count.
    pub jobs: usize,
    /// Download timeout.
    pub fetch_timeout: Duration,
    /// Retry schedule for state writes.
    pub retry: RetryPolicy,
    /// Whether the font cache hook runs.
    pub refresh_font_cache: bool,
}

impl ResolvedConfig {
    /// Staging area rooted at [`Self::staging_dir`].
    #[must_use]
    pub fn staging(&self) -> StagingArea {
        StagingArea::new(self.staging_dir.clone())
    }
}

impl InstallerConfig {
    /// Parse configuration from a file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn load_from(path: &Utf8Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })
    }

    /// Load configuration through `loader`, which receives the default
    /// config file location (if the platform has one).
    ///
    /// This is the seam tests use to avoid touching the real configuration
    /// directory.
    ///
    /// # Errors
    ///
    /// Propagates the loader's error.
    pub fn load_with<F>(dirs: &dyn BaseDirs, loader: F) -> Result<Self, ConfigError>
    where
        F: FnOnce(Option<Utf8PathBuf>) -> Result<Self, ConfigError>,
    {
        let default_path = dirs
            .config_dir()
            .and_then(|dir| Utf8PathBuf::from_path_buf(dir.join(CONFIG_FILE_NAME)).ok());
        loader(default_path)
    }

    /// Load the default config file when it exists, otherwise defaults.
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be read or parsed.
    pub fn load_default(dirs: &dyn BaseDirs) -> Result<Self, ConfigError> {
        Self::load_with(dirs, |path| match path {
            Some(path) if path.is_file() => Self::load_from(&path),
            _ => Ok(Self::default()),
        })
    }

    /// Fill unset directories from `dirs` and convert units.
    ///
    /// Defaults: fonts go to the platform font directory; other files to
    /// `<data>/files`; records to `<data>/state`; staging to `<cache>/staging`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingDirectory`] when a directory is unset
    /// and the platform offers no default.
    pub fn resolve(&self, dirs: &dyn BaseDirs) -> Result<ResolvedConfig, ConfigError> {
        let fonts_dir = or_platform(self.target_dir.as_ref(), "font", "target_dir", || {
            dirs.font_dir()
        })?;
        let files_dir = or_platform(self.files_dir.as_ref(), "files", "files_dir", || {
            dirs.data_dir().map(|dir| dir.join("files"))
        })?;
        let state_dir = or_platform(self.state_dir.as_ref(), "state", "state_dir", || {
            dirs.data_dir().map(|dir| dir.join("state"))
        })?;
        let staging_dir = or_platform(self.staging_dir.as_ref(), "staging", "staging_dir", || {
            dirs.cache_dir().map(|dir| dir.join("staging"))
        })?;

        Ok(ResolvedConfig {
            layout: TargetLayout::new(fonts_dir, files_dir),
            staging_dir,
            state_dir,
            jobs: self.jobs.unwrap_or_else(default_jobs).max(1),
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs),
            retry: RetryPolicy {
                attempts: self.persistence_retries,
                backoff: Duration::from_millis(self.retry_backoff_millis),
            },
            refresh_font_cache: self.refresh_font_cache,
        })
    }
}

fn or_platform(
    configured: Option<&Utf8PathBuf>,
    what: &'static str,
    key: &'static str,
    platform: impl FnOnce() -> Option<PathBuf>,
) -> Result<Utf8PathBuf, ConfigError> {
    if let Some(path) = configured {
        return Ok(path.clone());
    }
    let path = platform().ok_or(ConfigError::MissingDirectory { what, key })?;
    Utf8PathBuf::from_path_buf(path).map_err(|path| ConfigError::NonUtf8Directory { what, path })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dirs::MockBaseDirs;
    use rstest::rstest;

    fn platform_dirs() -> MockBaseDirs {
        let mut dirs = MockBaseDirs::new();
        dirs.expect_font_dir()
            .returning(|| Some(PathBuf::from("/home/u/.local/share/fonts")));
        dirs.expect_data_dir()
            .returning(|| Some(PathBuf::from("/home/u/.local/share/caskwright")));
        dirs.expect_cache_dir()
            .returning(|| Some(PathBuf::from("/home/u/.cache/caskwright")));
        dirs
    }

    #[rstest]
    fn defaults_are_conservative() {
        let config = InstallerConfig::default();

        assert_eq!(config.fetch_timeout_secs, 30);
        assert_eq!(config.persistence_retries, 3);
        assert_eq!(config.retry_backoff_millis, 50);
        assert!(config.refresh_font_cache);
        assert!(config.target_dir.is_none());
    }

    #[rstest]
    fn deserialises_overrides_from_toml() {
        let source = "target_dir = \"/srv/fonts\"\njobs = 2\nrefresh_font_cache = false\n";

        let config =
            toml::from_str::<InstallerConfig>(source).expect("expected configuration to parse");

        assert_eq!(config.target_dir, Some(Utf8PathBuf::from("/srv/fonts")));
        assert_eq!(config.jobs, Some(2));
        assert!(!config.refresh_font_cache);
        assert_eq!(config.persistence_retries, 3);
    }

    #[rstest]
    fn rejects_unknown_keys() {
        let error = toml::from_str::<InstallerConfig>("target = \"/tmp\"\n")
            .expect_err("unknown keys should be rejected");

        assert!(error.to_string().contains("unknown field"));
    }

    #[rstest]
    fn resolve_fills_directories_from_platform() {
        let resolved = InstallerConfig::default()
            .resolve(&platform_dirs())
            .expect("platform directories are available");

        assert_eq!(
            resolved.layout.fonts_dir,
            Utf8PathBuf::from("/home/u/.local/share/fonts")
        );
        assert_eq!(
            resolved.layout.files_dir,
            Utf8PathBuf::from("/home/u/.local/share/caskwright/files")
        );
        assert_eq!(
            resolved.state_dir,
            Utf8PathBuf::from("/home/u/.local/share/caskwright/state")
        );
        assert_eq!(
            resolved.staging_dir,
            Utf8PathBuf::from("/home/u/.cache/caskwright/staging")
        );
        assert!(resolved.jobs >= 1);
    }

    #[rstest]
    fn configured_paths_win_over_platform() {
        let config = InstallerConfig {
            target_dir: Some(Utf8PathBuf::from("/opt/fonts")),
            state_dir: Some(Utf8PathBuf::from("/var/lib/caskwright")),
            jobs: Some(0),
            persistence_retries: 5,
            retry_backoff_millis: 10,
            ..InstallerConfig::default()
        };

        let resolved = config.resolve(&platform_dirs()).expect("resolves");

        assert_eq!(resolved.layout.fonts_dir, Utf8PathBuf::from("/opt/fonts"));
        assert_eq!(resolved.state_dir, Utf8PathBuf::from("/var/lib/caskwright"));
        assert_eq!(resolved.jobs, 1);
        assert_eq!(
            resolved.retry,
            RetryPolicy {
                attempts: 5,
                backoff: Duration::from_millis(10),
            }
        );
    }

    #[rstest]
    fn missing_platform_font_dir_names_the_key() {
        let mut dirs = MockBaseDirs::new();
        dirs.expect_font_dir().returning(|| None);

        let error = InstallerConfig::default()
            .resolve(&dirs)
            .expect_err("no font directory");

        assert!(matches!(
            error,
            ConfigError::MissingDirectory {
                key: "target_dir",
                ..
            }
        ));
        assert!(error.to_string().contains("target_dir"));
    }

    #[rstest]
    fn load_with_passes_default_location() {
        let mut dirs = MockBaseDirs::new();
        dirs.expect_config_dir()
            .returning(|| Some(PathBuf::from("/home/u/.config/caskwright")));

        let config = InstallerConfig::load_with(&dirs, |path| {
            assert_eq!(
                path,
                Some(Utf8PathBuf::from("/home/u/.config/caskwright/caskwright.toml"))
            );
            Ok(InstallerConfig {
                jobs: Some(4),
                ..InstallerConfig::default()
            })
        })
        .expect("loader succeeds");

        assert_eq!(config.jobs, Some(4));
    }

    #[rstest]
    fn load_default_falls_back_when_file_is_absent() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config_dir = temp.path().to_path_buf();
        let mut dirs = MockBaseDirs::new();
        dirs.expect_config_dir()
            .returning(move || Some(config_dir.clone()));

        let config = InstallerConfig::load_default(&dirs).expect("defaults");

        assert_eq!(config, InstallerConfig::default());
    }

    #[rstest]
    fn load_from_reports_parse_errors_with_path() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = Utf8PathBuf::from_path_buf(temp.path().join(CONFIG_FILE_NAME))
            .expect("utf-8 temp path");
        std::fs::write(&path, "jobs = \"many\"\n").expect("write config");

        let error = InstallerConfig::load_from(&path).expect_err("jobs must be a number");

        assert!(matches!(error, ConfigError::Parse { .. }));
        assert!(error.to_string().contains(path.as_str()));
    }
}

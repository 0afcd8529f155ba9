//! Platform base directories.
//!
//! The installer only needs a handful of well-known locations; they sit
//! behind [`BaseDirs`] so configuration resolution can be tested without
//! touching the real home directory.

use directories_next::{ProjectDirs, UserDirs};
use std::path::PathBuf;

/// Source of platform directories.
#[cfg_attr(test, mockall::automock)]
pub trait BaseDirs {
    /// Per-user data directory for caskwright (state and managed files).
    fn data_dir(&self) -> Option<PathBuf>;

    /// Per-user cache directory for caskwright (staging).
    fn cache_dir(&self) -> Option<PathBuf>;

    /// Per-user configuration directory for caskwright.
    fn config_dir(&self) -> Option<PathBuf>;

    /// Directory the platform scans for per-user fonts.
    fn font_dir(&self) -> Option<PathBuf>;
}

/// [`BaseDirs`] backed by `directories-next`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBaseDirs;

impl SystemBaseDirs {
    fn project() -> Option<ProjectDirs> {
        ProjectDirs::from("", "", "caskwright")
    }
}

impl BaseDirs for SystemBaseDirs {
    fn data_dir(&self) -> Option<PathBuf> {
        Self::project().map(|dirs| dirs.data_dir().to_path_buf())
    }

    fn cache_dir(&self) -> Option<PathBuf> {
        Self::project().map(|dirs| dirs.cache_dir().to_path_buf())
    }

    fn config_dir(&self) -> Option<PathBuf> {
        Self::project().map(|dirs| dirs.config_dir().to_path_buf())
    }

    fn font_dir(&self) -> Option<PathBuf> {
        if cfg!(windows) {
            return directories_next::BaseDirs::new().map(|dirs| {
                dirs.data_local_dir()
                    .join("Microsoft")
                    .join("Windows")
                    .join("Fonts")
            });
        }
        UserDirs::new().and_then(|dirs| dirs.font_dir().map(PathBuf::from))
    }
}

//! Platform hooks run after the target directories change.
//!
//! Hooks run once an action's record is written, so a failing hook can never
//! undo an install. The executor logs hook failures and reports them as
//! warnings.

use crate::target::TargetLayout;
use camino::{Utf8Path, Utf8PathBuf};
use log::debug;
use std::io;
use std::process::{Command, Output};

/// Abstraction for running external commands.
pub trait CommandExecutor: Send + Sync {
    /// Runs a command with arguments and returns the captured output.
    ///
    /// # Errors
    ///
    /// Returns any I/O errors encountered while spawning or running the command.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use caskwright_installer::hooks::{CommandExecutor, SystemCommandExecutor};
    ///
    /// let executor = SystemCommandExecutor;
    /// let output = executor.run("fc-cache", &["--version"])?;
    /// assert!(output.status.success());
    /// # Ok::<(), std::io::Error>(())
    /// ```
    fn run(&self, cmd: &str, args: &[&str]) -> io::Result<Output>;
}

/// Executes commands on the host system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandExecutor;

impl CommandExecutor for SystemCommandExecutor {
    fn run(&self, cmd: &str, args: &[&str]) -> io::Result<Output> {
        Command::new(cmd).args(args).output()
    }
}

/// Errors raised by post-change hooks.
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    /// The hook command could not be started.
    #[error("failed to run {command}: {source}")]
    Spawn {
        /// The command line that was attempted.
        command: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The hook command exited unsuccessfully.
    #[error("{command} exited with {status}: {stderr}")]
    CommandFailed {
        /// The command line that failed.
        command: String,
        /// Rendered exit status.
        status: String,
        /// Captured standard error, trimmed.
        stderr: String,
    },
}

/// Platform collaborator notified after installed files change.
#[cfg_attr(test, mockall::automock)]
pub trait PostInstallHook: Send + Sync {
    /// React to changes in `dirs`.
    ///
    /// # Errors
    ///
    /// Returns [`HookError`] when the platform refresh fails.
    fn after_change(&self, dirs: &[Utf8PathBuf]) -> Result<(), HookError>;
}

/// Hook that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHook;

impl PostInstallHook for NoopHook {
    fn after_change(&self, _dirs: &[Utf8PathBuf]) -> Result<(), HookError> {
        Ok(())
    }
}

/// Refreshes the fontconfig cache for changed font directories.
#[derive(Debug)]
pub struct FontCacheHook<E = SystemCommandExecutor> {
    executor: E,
    fonts_dir: Utf8PathBuf,
}

impl FontCacheHook {
    /// Create a hook that runs `fc-cache` on the host.
    #[must_use]
    pub fn new(fonts_dir: Utf8PathBuf) -> Self {
        Self::with_executor(SystemCommandExecutor, fonts_dir)
    }
}

impl<E: CommandExecutor> FontCacheHook<E> {
    /// Create a hook with a custom command executor.
    #[must_use]
    pub fn with_executor(executor: E, fonts_dir: Utf8PathBuf) -> Self {
        Self {
            executor,
            fonts_dir,
        }
    }

    fn refresh(&self, dir: &Utf8Path) -> Result<(), HookError> {
        let args = ["-f", dir.as_str()];
        let command = format!("fc-cache {}", args.join(" "));
        debug!("running {command}");
        let output = self
            .executor
            .run("fc-cache", &args)
            .map_err(|source| HookError::Spawn {
                command: command.clone(),
                source,
            })?;
        if output.status.success() {
            return Ok(());
        }
        Err(HookError::CommandFailed {
            command,
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        })
    }
}

impl<E: CommandExecutor> PostInstallHook for FontCacheHook<E> {
    fn after_change(&self, dirs: &[Utf8PathBuf]) -> Result<(), HookError> {
        if dirs.iter().any(|dir| dir.starts_with(&self.fonts_dir)) {
            self.refresh(&self.fonts_dir)?;
        }
        Ok(())
    }
}

/// Select the hook for this platform.
///
/// `fc-cache` is only run on Unix systems other than macOS, where fonts in
/// the user directory are picked up without a cache refresh.
#[must_use]
pub fn platform_hook(layout: &TargetLayout, refresh_font_cache: bool) -> Box<dyn PostInstallHook> {
    if refresh_font_cache && cfg!(all(unix, not(target_os = "macos"))) {
        Box::new(FontCacheHook::new(layout.fonts_dir.clone()))
    } else {
        Box::new(NoopHook)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{ExpectedCall, StubExecutor, failure_output, success_output};

    fn hook(expected: Vec<ExpectedCall>) -> FontCacheHook<StubExecutor> {
        FontCacheHook::with_executor(StubExecutor::new(expected), "/home/u/.fonts".into())
    }

    #[test]
    fn refreshes_font_dir_once() {
        let hook = hook(vec![ExpectedCall {
            cmd: "fc-cache",
            args: vec!["-f", "/home/u/.fonts"],
            result: Ok(success_output()),
        }]);

        hook.after_change(&["/home/u/.fonts".into(), "/home/u/.fonts/sub".into()])
            .expect("hook succeeds");
        hook.executor.assert_finished();
    }

    #[test]
    fn ignores_non_font_dirs() {
        let hook = hook(Vec::new());
        hook.after_change(&["/home/u/files".into()])
            .expect("hook succeeds");
        hook.executor.assert_finished();
    }

    #[test]
    fn reports_command_failure() {
        let hook = hook(vec![ExpectedCall {
            cmd: "fc-cache",
            args: vec!["-f", "/home/u/.fonts"],
            result: Ok(failure_output("cache locked\n")),
        }]);

        let err = hook
            .after_change(&["/home/u/.fonts".into()])
            .expect_err("hook fails");
        assert!(
            matches!(&err, HookError::CommandFailed { stderr, .. } if stderr == "cache locked")
        );
    }

    #[test]
    fn reports_missing_binary() {
        let hook = hook(vec![ExpectedCall {
            cmd: "fc-cache",
            args: vec!["-f", "/home/u/.fonts"],
            result: Err(io::Error::new(io::ErrorKind::NotFound, "no fc-cache")),
        }]);

        let err = hook
            .after_change(&["/home/u/.fonts".into()])
            .expect_err("hook fails");
        assert!(matches!(err, HookError::Spawn { .. }));
    }

    #[test]
    fn disabled_refresh_selects_noop() {
        let layout = TargetLayout::new("/f".into(), "/g".into());
        platform_hook(&layout, false)
            .after_change(&["/f".into()])
            .expect("noop succeeds");
    }
}

//! Compiler command-line assembly shared by worker and standalone modes.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use crate::customizer::ArgumentCustomizer;

/// Exit code reported when a subprocess ended without one.
const UNKNOWN_EXIT_CODE: i32 = 1;

/// Offset added to a terminating signal number, as shells report it.
#[cfg(unix)]
const SIGNAL_EXIT_OFFSET: i32 = 128;

/// The executable that hosts the compiler and the compiler entry point.
///
/// For .NET toolchains the executable is the `dotnet` host and the compiler
/// is the front-end assembly (`csc.dll`, `fsc.dll`); both are fixed for the
/// lifetime of the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerCommand {
    executable: PathBuf,
    compiler: PathBuf,
}

impl CompilerCommand {
    /// Creates a command description.
    #[must_use]
    pub fn new(executable: impl Into<PathBuf>, compiler: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            compiler: compiler.into(),
        }
    }

    /// Returns the executable path.
    #[must_use]
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Returns the compiler path.
    #[must_use]
    pub fn compiler(&self) -> &Path {
        &self.compiler
    }

    /// Lists the full argument vector (excluding the executable) for one run:
    /// the compiler, the caller's arguments, then the customizer's extras.
    #[must_use]
    pub fn arguments<I, S>(
        &self,
        arguments: I,
        customizer: &dyn ArgumentCustomizer,
        base_dir: &Path,
    ) -> Vec<OsString>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut argv = vec![self.compiler.clone().into_os_string()];
        argv.extend(
            arguments
                .into_iter()
                .map(|argument| argument.as_ref().to_os_string()),
        );
        argv.extend(customizer.extra_arguments(&self.compiler, base_dir));
        argv
    }

    /// Builds a [`Command`] for one run; stdio is left to the caller.
    #[must_use]
    pub fn build<I, S>(
        &self,
        arguments: I,
        customizer: &dyn ArgumentCustomizer,
        base_dir: &Path,
    ) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut command = Command::new(&self.executable);
        command.args(self.arguments(arguments, customizer, base_dir));
        command
    }
}

/// Converts a subprocess status into the integer exit code reported upstream.
///
/// Processes terminated by a signal report `128 + signal` on Unix.
#[must_use]
pub fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    signal_exit_code(status).unwrap_or(UNKNOWN_EXIT_CODE)
}

#[cfg(unix)]
fn signal_exit_code(status: ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;

    status
        .signal()
        .map(|signal| SIGNAL_EXIT_OFFSET.saturating_add(signal))
}

#[cfg(not(unix))]
fn signal_exit_code(_status: ExitStatus) -> Option<i32> {
    None
}

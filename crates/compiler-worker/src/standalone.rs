//! One-shot compilation outside worker mode.

use std::env;
use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::STANDALONE_TARGET;
use crate::command::{CompilerCommand, exit_code_of};
use crate::customizer::ArgumentCustomizer;

/// Errors raised while running a single compilation.
#[derive(Debug, Clone, Error)]
pub enum StandaloneError {
    /// The current working directory could not be determined.
    #[error("failed to resolve the current directory: {source}")]
    CurrentDir {
        /// Underlying I/O failure.
        source: Arc<io::Error>,
    },
    /// The compiler could not be started.
    #[error("failed to start '{}': {source}", executable.display())]
    Spawn {
        /// Program that failed to start.
        executable: PathBuf,
        /// Underlying I/O failure.
        source: Arc<io::Error>,
    },
    /// Waiting for the compiler failed.
    #[error("failed to wait for '{}': {source}", executable.display())]
    Wait {
        /// Program being awaited.
        executable: PathBuf,
        /// Underlying I/O failure.
        source: Arc<io::Error>,
    },
}

/// Runs the compiler once with inherited standard streams.
///
/// The path-map base is the current working directory. Returns the
/// compiler's exit code.
///
/// # Errors
///
/// Returns a [`StandaloneError`] when the compiler cannot be started or
/// awaited.
pub fn run_standalone(
    command: &CompilerCommand,
    arguments: &[OsString],
    customizer: &dyn ArgumentCustomizer,
) -> Result<i32, StandaloneError> {
    let base_dir = env::current_dir().map_err(|source| StandaloneError::CurrentDir {
        source: Arc::new(source),
    })?;
    debug!(
        target: STANDALONE_TARGET,
        executable = %command.executable().display(),
        argument_count = arguments.len(),
        base_dir = %base_dir.display(),
        "running compiler once"
    );

    let status = command
        .build(arguments, customizer, &base_dir)
        .status()
        .map_err(|source| StandaloneError::Spawn {
            executable: command.executable().to_path_buf(),
            source: Arc::new(source),
        })?;
    let exit_code = exit_code_of(status);
    info!(target: STANDALONE_TARGET, exit_code, "compiler exited");
    Ok(exit_code)
}

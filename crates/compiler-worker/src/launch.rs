//! Process entry point: argument parsing, configuration, mode selection.

use std::env;
use std::ffi::OsString;
use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;

use ortho_config::OrthoError;
use thiserror::Error;
use tracing::{error, info, warn};

use worker_config::Config;

use crate::LAUNCH_TARGET;
use crate::cli::{Invocation, UsageError, parse_invocation};
use crate::command::CompilerCommand;
use crate::customizer::PathMapCustomizer;
use crate::executor::SubprocessExecutor;
use crate::sink::ResponseSink;
use crate::standalone::{StandaloneError, run_standalone};
use crate::telemetry::{self, TelemetryError};
use crate::worker::{Worker, WorkerError};

/// Exit code for usage, configuration and fatal protocol errors.
pub const FATAL_EXIT_CODE: u8 = 2;

/// Errors that stop the process before or while serving.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The command line is invalid.
    #[error(transparent)]
    Usage(#[from] UsageError),
    /// A configuration layer could not be loaded.
    #[error("failed to load configuration: {0}")]
    Configuration(Arc<OrthoError>),
    /// Logging could not be configured.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    /// The worker's working directory could not be determined.
    #[error("failed to resolve the working directory: {source}")]
    WorkingDir {
        /// Underlying I/O failure.
        source: Arc<io::Error>,
    },
    /// The request stream failed.
    #[error(transparent)]
    Worker(#[from] WorkerError),
    /// The one-shot compilation could not run.
    #[error(transparent)]
    Standalone(#[from] StandaloneError),
}

/// Runs the worker with the given process arguments.
///
/// Fatal errors are written to `stderr` and reported as
/// [`FATAL_EXIT_CODE`]. In standalone mode the compiler's exit code is
/// returned; codes outside `0..=255` cannot be expressed portably and are
/// logged before being reported as `1`.
#[must_use]
pub fn run<I, E>(args: I, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    E: Write,
{
    let argv: Vec<OsString> = args.into_iter().collect();
    match launch(&argv) {
        Ok(code) => process_exit_code(code),
        Err(launch_error) => {
            error!(target: LAUNCH_TARGET, error = %launch_error, "worker stopped");
            drop(writeln!(stderr, "compiler-worker: {launch_error}"));
            ExitCode::from(FATAL_EXIT_CODE)
        }
    }
}

fn process_exit_code(code: i32) -> ExitCode {
    u8::try_from(code).map_or_else(
        |_| {
            warn!(
                target: LAUNCH_TARGET,
                compiler_exit_code = code,
                "compiler exit code does not fit a process exit status; reporting 1"
            );
            ExitCode::FAILURE
        },
        ExitCode::from,
    )
}

fn launch(args: &[OsString]) -> Result<i32, LaunchError> {
    let parsed = parse_invocation(args)?;
    let config =
        Config::load_layers(parsed.config_arguments).map_err(LaunchError::Configuration)?;
    telemetry::initialise(&config)?;

    match parsed.invocation {
        Invocation::Worker(command) => {
            serve(command, &config)?;
            Ok(0)
        }
        Invocation::Standalone { command, arguments } => Ok(run_standalone(
            &command,
            &arguments,
            &PathMapCustomizer::default(),
        )?),
    }
}

fn serve(command: CompilerCommand, config: &Config) -> Result<(), LaunchError> {
    let working_dir = env::current_dir().map_err(|source| LaunchError::WorkingDir {
        source: Arc::new(source),
    })?;
    let format = config.wire_format();
    info!(
        target: LAUNCH_TARGET,
        executable = %command.executable().display(),
        compiler = %command.compiler().display(),
        wire_format = %format,
        max_concurrent_requests = config.concurrency_limit(),
        multiplex_sandboxing = config.multiplex_sandboxing(),
        "starting persistent worker"
    );

    let executor = SubprocessExecutor::new(
        command,
        Arc::new(PathMapCustomizer::default()),
        working_dir,
    )
    .with_multiplex_sandboxing(config.multiplex_sandboxing());
    let worker = Worker::new(executor, ResponseSink::new(format.writer(io::stdout())))
        .with_concurrency_limit(config.concurrency_limit())
        .with_multiplex_sandboxing(config.multiplex_sandboxing());

    let mut reader = format.reader(io::stdin());
    worker.run(&mut *reader)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::success(0, ExitCode::SUCCESS)]
    #[case::compiler_error(1, ExitCode::FAILURE)]
    #[case::signal(137, ExitCode::from(137))]
    #[case::largest(255, ExitCode::from(255))]
    #[case::ntstatus(-1_073_741_819, ExitCode::FAILURE)]
    #[case::negative(-1, ExitCode::FAILURE)]
    #[case::too_large(256, ExitCode::FAILURE)]
    fn compiler_exit_codes_map_to_process_status(#[case] code: i32, #[case] expected: ExitCode) {
        assert_eq!(process_exit_code(code), expected);
    }
}

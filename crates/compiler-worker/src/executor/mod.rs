//! Per-request compiler execution.
//!
//! [`SubprocessExecutor`] implements [`RequestExecutor`] by spawning the
//! compiler with standard input closed, draining standard output and standard
//! error concurrently, and folding the result into a [`WorkResponse`]. Every
//! failure on the way is converted into a response with exit code `1`; the
//! executor never returns an error to the dispatcher.
//!
//! The executor abstraction lets dispatcher tests substitute doubles that
//! answer without spawning processes.

mod errors;

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{ChildStderr, ChildStdout, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use worker_protocol::{WorkRequest, WorkResponse, compose_output};

use crate::EXECUTOR_TARGET;
use crate::cancellation::CancelToken;
use crate::command::{CompilerCommand, exit_code_of};
use crate::customizer::ArgumentCustomizer;

pub use self::errors::ExecutionError;

/// Interval between exit polls once the subprocess has closed its streams.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Runs one request to completion.
///
/// # Example
///
/// ```
/// use compiler_worker::{CancelToken, RequestExecutor};
/// use worker_protocol::{WorkRequest, WorkResponse};
///
/// struct Echo;
///
/// impl RequestExecutor for Echo {
///     fn execute(&self, request: &WorkRequest, _token: &CancelToken) -> WorkResponse {
///         WorkResponse::completed(request.request_id, 0, request.arguments.join(" "))
///     }
/// }
///
/// let response = Echo.execute(&WorkRequest::new(3, vec!["a".into()]), &CancelToken::new());
/// assert_eq!(response.output, "a");
/// ```
pub trait RequestExecutor: Send + Sync {
    /// Executes `request`, reporting every failure through the response.
    fn execute(&self, request: &WorkRequest, token: &CancelToken) -> WorkResponse;
}

/// Executes requests by spawning the compiler as a child process.
pub struct SubprocessExecutor {
    command: CompilerCommand,
    customizer: Arc<dyn ArgumentCustomizer>,
    working_dir: PathBuf,
    multiplex_sandboxing: bool,
}

impl SubprocessExecutor {
    /// Creates an executor running `command` from `working_dir`.
    #[must_use]
    pub fn new(
        command: CompilerCommand,
        customizer: Arc<dyn ArgumentCustomizer>,
        working_dir: PathBuf,
    ) -> Self {
        Self {
            command,
            customizer,
            working_dir,
            multiplex_sandboxing: false,
        }
    }

    /// Runs sandboxed requests inside their sandbox directory.
    #[must_use]
    pub const fn with_multiplex_sandboxing(mut self, enabled: bool) -> Self {
        self.multiplex_sandboxing = enabled;
        self
    }

    /// Returns the directory whose prefix is remapped for `request`.
    #[must_use]
    pub fn base_dir(&self, request: &WorkRequest) -> PathBuf {
        if self.multiplex_sandboxing && request.is_sandboxed() {
            self.working_dir.join(&request.sandbox_dir)
        } else {
            self.working_dir.clone()
        }
    }

    fn run(
        &self,
        request: &WorkRequest,
        token: &CancelToken,
    ) -> Result<WorkResponse, ExecutionError> {
        let base_dir = self.base_dir(request);
        let mut command = self
            .command
            .build(&request.arguments, &*self.customizer, &base_dir);
        if self.multiplex_sandboxing && request.is_sandboxed() {
            command.current_dir(&base_dir);
        }
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!(
            target: EXECUTOR_TARGET,
            request_id = request.request_id,
            executable = %self.command.executable().display(),
            argument_count = request.arguments.len(),
            base_dir = %base_dir.display(),
            "spawning compiler"
        );

        let started = Instant::now();
        let mut child = command.spawn().map_err(|source| ExecutionError::Spawn {
            executable: self.command.executable().to_path_buf(),
            source: Arc::new(source),
        })?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        token.attach(child);

        let streams = collect_streams(stdout, stderr);
        if streams.is_err() {
            token.terminate();
        }
        let status = wait_for_exit(token);
        drop(token.detach());
        let (stdout_text, stderr_text) = streams?;
        let exit_code = exit_code_of(status?);

        debug!(
            target: EXECUTOR_TARGET,
            request_id = request.request_id,
            exit_code,
            stdout_bytes = stdout_text.len(),
            stderr_bytes = stderr_text.len(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "compiler exited"
        );

        Ok(WorkResponse::completed(
            request.request_id,
            exit_code,
            compose_output(&stdout_text, &stderr_text),
        ))
    }

    /// Returns the working directory requests run from by default.
    #[must_use]
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }
}

impl RequestExecutor for SubprocessExecutor {
    fn execute(&self, request: &WorkRequest, token: &CancelToken) -> WorkResponse {
        match self.run(request, token) {
            Ok(response) => response,
            Err(error) => {
                warn!(
                    target: EXECUTOR_TARGET,
                    request_id = request.request_id,
                    %error,
                    "request failed inside the worker"
                );
                WorkResponse::failure(request.request_id, error.to_string())
            }
        }
    }
}

/// Drains both streams to completion without letting either block the other.
fn collect_streams(
    stdout_pipe: Option<ChildStdout>,
    stderr_pipe: Option<ChildStderr>,
) -> Result<(String, String), ExecutionError> {
    let stdout = stdout_pipe.ok_or(ExecutionError::MissingPipe { stream: "stdout" })?;
    let stderr = stderr_pipe.ok_or(ExecutionError::MissingPipe { stream: "stderr" })?;

    let stderr_reader = thread::Builder::new()
        .name(String::from("stderr-drain"))
        .spawn(move || read_stream(stderr, "stderr"))
        .map_err(|source| ExecutionError::DrainThread {
            stream: "stderr",
            source: Arc::new(source),
        })?;
    let stdout_text = read_stream(stdout, "stdout");
    let stderr_text = stderr_reader
        .join()
        .map_err(|_| ExecutionError::DrainPanicked { stream: "stderr" })?;

    Ok((stdout_text?, stderr_text?))
}

fn read_stream(mut reader: impl Read, stream: &'static str) -> Result<String, ExecutionError> {
    let mut bytes = Vec::new();
    reader
        .read_to_end(&mut bytes)
        .map_err(|source| ExecutionError::Read {
            stream,
            source: Arc::new(source),
        })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Polls under the token's lock so a concurrent cancel cannot race the reap.
fn wait_for_exit(token: &CancelToken) -> Result<ExitStatus, ExecutionError> {
    loop {
        match token.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => thread::sleep(EXIT_POLL_INTERVAL),
            Err(source) => {
                return Err(ExecutionError::Wait {
                    source: Arc::new(source),
                });
            }
        }
    }
}

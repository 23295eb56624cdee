//! Failures raised while running a compiler subprocess.
//!
//! None of these escape the executor: each is rendered into the `output` of
//! a response with exit code `1`. I/O errors are wrapped in `Arc` so the enum
//! stays cheap to clone into diagnostics.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Errors arising while executing one request.
#[derive(Debug, Clone, Error)]
pub enum ExecutionError {
    /// The subprocess could not be started.
    #[error("failed to start '{}': {source}", executable.display())]
    Spawn {
        /// Executable that was launched.
        executable: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// A standard stream was not captured at spawn time.
    #[error("failed to capture subprocess {stream}")]
    MissingPipe {
        /// Name of the stream (`stdout` or `stderr`).
        stream: &'static str,
    },

    /// Reading a captured stream failed.
    #[error("failed to read subprocess {stream}: {source}")]
    Read {
        /// Name of the stream being drained.
        stream: &'static str,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The helper thread draining a stream could not be started.
    #[error("failed to start {stream} reader thread: {source}")]
    DrainThread {
        /// Name of the stream being drained.
        stream: &'static str,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The helper thread draining a stream panicked.
    #[error("{stream} reader thread panicked")]
    DrainPanicked {
        /// Name of the stream being drained.
        stream: &'static str,
    },

    /// Waiting for the subprocess to exit failed.
    #[error("failed to wait for subprocess: {source}")]
    Wait {
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_error_names_executable_and_cause() {
        let error = ExecutionError::Spawn {
            executable: PathBuf::from("/missing/dotnet"),
            source: Arc::new(io::Error::from(io::ErrorKind::NotFound)),
        };
        let message = error.to_string();
        assert!(
            message.contains("/missing/dotnet"),
            "expected executable in message: {message}"
        );
        assert!(
            message.starts_with("failed to start"),
            "unexpected message: {message}"
        );
    }

    #[test]
    fn error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ExecutionError>();
    }
}

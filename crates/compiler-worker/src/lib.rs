//! Persistent compiler worker.
//!
//! A build orchestrator starts one `compiler-worker` process per compiler and
//! streams length-delimited [`WorkRequest`](worker_protocol::WorkRequest)
//! frames to it over standard input. Each request runs the compiler as a
//! subprocess on its own thread; the result comes back as a
//! [`WorkResponse`](worker_protocol::WorkResponse) frame on standard output.
//! Without `--persistent_worker` the binary runs the compiler once and
//! forwards its exit code.
//!
//! The crate is organised around the seams of that loop:
//!
//! - [`customizer`] decides which extra arguments each compiler family needs
//!   for relocatable output;
//! - [`executor`] spawns the compiler and folds its output into a response;
//! - [`sink`] serialises responses onto the shared output stream;
//! - [`worker`] reads, classifies and dispatches requests;
//! - [`cancellation`] tracks in-flight requests so cancel messages can reach
//!   them.

pub mod cancellation;
pub mod cli;
pub mod command;
pub mod customizer;
pub mod executor;
mod launch;
pub mod limit;
pub mod sink;
pub mod standalone;
pub mod telemetry;
pub mod worker;

/// Tracing target for the dispatcher.
pub(crate) const WORKER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::worker");
/// Tracing target for subprocess execution.
pub(crate) const EXECUTOR_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::executor");
/// Tracing target for cancellation handling.
pub(crate) const CANCELLATION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::cancellation");
/// Tracing target for one-shot runs.
pub(crate) const STANDALONE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::standalone");
/// Tracing target for start-up and shutdown.
pub(crate) const LAUNCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::launch");

pub use self::cancellation::{CancelOutcome, CancelToken, CancellationRegistry};
pub use self::cli::{Invocation, ParsedArguments, UsageError, parse_invocation};
pub use self::command::{CompilerCommand, exit_code_of};
pub use self::customizer::{
    ArgumentCustomizer, CompilerFamily, NoExtraArguments, PathMapCustomizer,
};
pub use self::executor::{ExecutionError, RequestExecutor, SubprocessExecutor};
pub use self::launch::{FATAL_EXIT_CODE, LaunchError, run};
pub use self::limit::ConcurrencyLimit;
pub use self::sink::{ResponseSink, SinkError};
pub use self::standalone::{StandaloneError, run_standalone};
pub use self::telemetry::TelemetryError;
pub use self::worker::{SANDBOX_UNSUPPORTED_MESSAGE, Worker, WorkerError, WorkerSummary};

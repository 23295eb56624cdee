//! The persistent worker loop.
//!
//! [`Worker::run`] reads one request at a time and classifies it:
//!
//! - a cancel message is routed to the [`CancellationRegistry`] and never
//!   answered on its own;
//! - a sandboxed request is rejected inline unless multiplex sandboxing is
//!   enabled;
//! - anything else is registered and handed to a dedicated thread that runs
//!   the executor and writes the response through the shared
//!   [`ResponseSink`].
//!
//! The read loop never waits on execution. A framing error ends the loop;
//! end of stream drains the in-flight requests before returning.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use worker_protocol::{FrameReader, ProtocolError, WorkRequest, WorkResponse};

use crate::WORKER_TARGET;
use crate::cancellation::{CancelOutcome, CancelToken, CancellationRegistry};
use crate::executor::RequestExecutor;
use crate::limit::ConcurrencyLimit;
use crate::sink::ResponseSink;

/// Diagnostic returned for sandboxed requests when sandboxing is disabled.
pub const SANDBOX_UNSUPPORTED_MESSAGE: &str =
    "sandboxed multiplex requests are not supported by this worker";

/// Diagnostic returned for requests cancelled before their compiler started.
pub const CANCELLED_BEFORE_START_MESSAGE: &str = "request cancelled before the compiler started";

/// Fatal errors that end the worker loop.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The request stream could not be decoded.
    #[error("failed to read work request: {source}")]
    Protocol {
        /// Underlying framing failure.
        #[from]
        source: ProtocolError,
    },
}

/// Counts of the messages handled by one [`Worker::run`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    /// Requests handed to the executor.
    pub scheduled: usize,
    /// Requests answered inline without running the compiler.
    pub rejected: usize,
    /// Cancel messages received.
    pub cancellations: usize,
}

/// Dispatches decoded requests to concurrent executor tasks.
pub struct Worker<E> {
    executor: Arc<E>,
    sink: Arc<ResponseSink>,
    registry: CancellationRegistry,
    limit: Option<Arc<ConcurrencyLimit>>,
    multiplex_sandboxing: bool,
}

impl<E> Worker<E>
where
    E: RequestExecutor + 'static,
{
    /// Creates a worker that answers through `sink`.
    #[must_use]
    pub fn new(executor: E, sink: ResponseSink) -> Self {
        Self {
            executor: Arc::new(executor),
            sink: Arc::new(sink),
            registry: CancellationRegistry::new(),
            limit: None,
            multiplex_sandboxing: false,
        }
    }

    /// Caps the number of requests executing at once.
    ///
    /// `None` leaves execution unbounded.
    #[must_use]
    pub fn with_concurrency_limit(mut self, permits: Option<usize>) -> Self {
        self.limit = permits.map(ConcurrencyLimit::shared);
        self
    }

    /// Accepts sandboxed requests instead of rejecting them.
    #[must_use]
    pub const fn with_multiplex_sandboxing(mut self, enabled: bool) -> Self {
        self.multiplex_sandboxing = enabled;
        self
    }

    /// Returns the registry tracking in-flight requests.
    #[must_use]
    pub const fn registry(&self) -> &CancellationRegistry {
        &self.registry
    }

    /// Serves requests from `reader` until the stream ends.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Protocol`] when a frame cannot be decoded. Tasks
    /// still running at that point are abandoned.
    pub fn run(&self, reader: &mut dyn FrameReader) -> Result<WorkerSummary, WorkerError> {
        let mut summary = WorkerSummary::default();
        let mut tasks: Vec<JoinHandle<()>> = Vec::new();

        loop {
            let request = match reader.read_request() {
                Ok(Some(request)) => request,
                Ok(None) => break,
                Err(source) => {
                    error!(
                        target: WORKER_TARGET,
                        error = %source,
                        in_flight = self.registry.len(),
                        "request stream is corrupt; stopping"
                    );
                    return Err(WorkerError::Protocol { source });
                }
            };
            tasks.retain(|task| !task.is_finished());
            if let Some(task) = self.dispatch(request, &mut summary) {
                tasks.push(task);
            }
        }

        info!(
            target: WORKER_TARGET,
            in_flight = tasks.len(),
            "request stream closed; waiting for in-flight requests"
        );
        for task in tasks {
            if task.join().is_err() {
                warn!(target: WORKER_TARGET, "request task panicked outside the executor");
            }
        }
        info!(
            target: WORKER_TARGET,
            scheduled = summary.scheduled,
            rejected = summary.rejected,
            cancellations = summary.cancellations,
            "worker finished"
        );
        Ok(summary)
    }

    fn dispatch(&self, request: WorkRequest, summary: &mut WorkerSummary) -> Option<JoinHandle<()>> {
        if request.cancel {
            summary.cancellations += 1;
            self.cancel(request.request_id);
            return None;
        }

        if request.is_sandboxed() && !self.multiplex_sandboxing {
            summary.rejected += 1;
            warn!(
                target: WORKER_TARGET,
                request_id = request.request_id,
                sandbox_dir = %request.sandbox_dir,
                "rejecting sandboxed request"
            );
            self.respond(&WorkResponse::failure(
                request.request_id,
                SANDBOX_UNSUPPORTED_MESSAGE,
            ));
            return None;
        }

        let task = self.schedule(request);
        if task.is_some() {
            summary.scheduled += 1;
        } else {
            summary.rejected += 1;
        }
        task
    }

    fn cancel(&self, request_id: i32) {
        match self.registry.cancel(request_id) {
            CancelOutcome::Signalled { killed } => info!(
                target: WORKER_TARGET,
                request_id,
                killed,
                "cancelled in-flight request"
            ),
            CancelOutcome::Unknown => debug!(
                target: WORKER_TARGET,
                request_id,
                "ignoring cancel for a request that is not in flight"
            ),
        }
    }

    fn schedule(&self, request: WorkRequest) -> Option<JoinHandle<()>> {
        let request_id = request.request_id;
        let token = self.registry.register(request_id);
        let task = RequestTask {
            executor: Arc::clone(&self.executor),
            sink: Arc::clone(&self.sink),
            registry: self.registry.clone(),
            limit: self.limit.clone(),
            token: token.clone(),
        };

        debug!(
            target: WORKER_TARGET,
            request_id,
            argument_count = request.arguments.len(),
            "scheduling request"
        );
        match thread::Builder::new()
            .name(format!("request-{request_id}"))
            .spawn(move || task.run(&request))
        {
            Ok(handle) => Some(handle),
            Err(spawn_error) => {
                self.registry.deregister(request_id, &token);
                warn!(
                    target: WORKER_TARGET,
                    request_id,
                    error = %spawn_error,
                    "failed to start request thread"
                );
                self.respond(&WorkResponse::failure(
                    request_id,
                    format!("failed to start request thread: {spawn_error}"),
                ));
                None
            }
        }
    }

    fn respond(&self, response: &WorkResponse) {
        write_response(&self.sink, response);
    }
}

impl<E> std::fmt::Debug for Worker<E> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Worker")
            .field("in_flight", &self.registry.len())
            .field("limited", &self.limit.is_some())
            .field("multiplex_sandboxing", &self.multiplex_sandboxing)
            .finish_non_exhaustive()
    }
}

/// State moved onto a request thread.
struct RequestTask<E> {
    executor: Arc<E>,
    sink: Arc<ResponseSink>,
    registry: CancellationRegistry,
    limit: Option<Arc<ConcurrencyLimit>>,
    token: CancelToken,
}

impl<E: RequestExecutor> RequestTask<E> {
    fn run(self, request: &WorkRequest) {
        let _permit = self.limit.as_ref().map(ConcurrencyLimit::acquire);
        let response = if self.token.is_cancelled() {
            WorkResponse::failure(request.request_id, CANCELLED_BEFORE_START_MESSAGE)
        } else {
            self.execute(request)
        };

        // Bazel reuses ids once answered, so the entry goes before the write.
        self.registry.deregister(request.request_id, &self.token);
        let answer = if self.token.is_cancelled() {
            response.cancelled()
        } else {
            response
        };
        write_response(&self.sink, &answer);
    }

    fn execute(&self, request: &WorkRequest) -> WorkResponse {
        panic::catch_unwind(AssertUnwindSafe(|| {
            self.executor.execute(request, &self.token)
        }))
        .unwrap_or_else(|payload| {
            let message = panic_message(payload.as_ref());
            error!(
                target: WORKER_TARGET,
                request_id = request.request_id,
                panic = %message,
                "executor panicked"
            );
            WorkResponse::failure(
                request.request_id,
                format!("worker panicked while running the compiler: {message}"),
            )
        })
    }
}

fn write_response(sink: &ResponseSink, response: &WorkResponse) {
    match sink.write(response) {
        Ok(()) => debug!(
            target: WORKER_TARGET,
            request_id = response.request_id,
            exit_code = response.exit_code,
            was_cancelled = response.was_cancelled,
            "response written"
        ),
        Err(sink_error) => error!(
            target: WORKER_TARGET,
            request_id = response.request_id,
            error = %sink_error,
            "failed to write response"
        ),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| String::from("non-string panic payload"))
}

#[cfg(test)]
mod tests;

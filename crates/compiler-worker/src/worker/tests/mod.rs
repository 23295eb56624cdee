//! Unit and behaviour tests for the worker loop.

use std::io::{self, Cursor, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use mockall::mock;
use rstest::{fixture, rstest};
use worker_protocol::{
    FrameReader, INTERNAL_FAILURE_EXIT_CODE, ProtocolError, WireFormat, WorkRequest, WorkResponse,
};

use super::*;


mock! {
    pub Executor {}
    impl RequestExecutor for Executor {
        fn execute(&self, request: &WorkRequest, token: &CancelToken) -> WorkResponse;
    }
}

/// In-memory standard output shared between the sink and the assertions.
#[derive(Clone, Default)]
pub(super) struct SharedBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub(super) fn responses(&self) -> Vec<WorkResponse> {
        let bytes = self
            .bytes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        WireFormat::Proto
            .decode_responses(&bytes)
            .expect("worker output decodes cleanly")
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub(super) fn worker_with(executor: MockExecutor) -> (Worker<MockExecutor>, SharedBuffer) {
    let buffer = SharedBuffer::default();
    let sink = ResponseSink::new(WireFormat::Proto.writer(buffer.clone()));
    (Worker::new(executor, sink), buffer)
}

pub(super) fn request_stream(requests: &[WorkRequest]) -> Box<dyn FrameReader + Send> {
    let mut bytes = Vec::new();
    for request in requests {
        bytes.extend(
            WireFormat::Proto
                .encode_request(request)
                .expect("encode request"),
        );
    }
    WireFormat::Proto.reader(Cursor::new(bytes))
}

/// Executor double that echoes the request id and never fails.
pub(super) fn echoing_executor() -> MockExecutor {
    let mut executor = MockExecutor::new();
    executor
        .expect_execute()
        .returning(|request, _token| WorkResponse::completed(request.request_id, 0, "compiled"));
    executor
}

/// Executor double that blocks until its request is cancelled.
pub(super) fn blocking_executor() -> MockExecutor {
    let mut executor = MockExecutor::new();
    executor.expect_execute().returning(|request, token| {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !token.is_cancelled() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        WorkResponse::completed(request.request_id, 137, "")
    });
    executor
}

#[fixture]
fn idle_executor() -> MockExecutor {
    let mut executor = MockExecutor::new();
    executor.expect_execute().never();
    executor
}

#[rstest]
fn empty_stream_exits_cleanly(idle_executor: MockExecutor) {
    let (worker, buffer) = worker_with(idle_executor);

    let summary = worker.run(&mut *request_stream(&[])).expect("clean shutdown");

    assert_eq!(summary, WorkerSummary::default());
    assert!(buffer.responses().is_empty());
}

#[test]
fn request_is_executed_and_answered() {
    let mut executor = MockExecutor::new();
    executor
        .expect_execute()
        .withf(|request, token| {
            request.arguments == ["/out:a.dll", "a.cs"] && !token.is_cancelled()
        })
        .times(1)
        .returning(|request, _token| WorkResponse::completed(request.request_id, 3, "warning"));
    let (worker, buffer) = worker_with(executor);

    let request = WorkRequest::new(5, vec![String::from("/out:a.dll"), String::from("a.cs")]);
    let summary = worker.run(&mut *request_stream(&[request])).expect("run");

    assert_eq!(summary.scheduled, 1);
    assert_eq!(
        buffer.responses(),
        vec![WorkResponse::completed(5, 3, "warning")]
    );
    assert!(worker.registry().is_empty());
}

#[rstest]
fn unknown_cancel_produces_no_response(idle_executor: MockExecutor) {
    let (worker, buffer) = worker_with(idle_executor);

    let summary = worker
        .run(&mut *request_stream(&[WorkRequest::cancellation(8)]))
        .expect("run");

    assert_eq!(summary.cancellations, 1);
    assert_eq!(summary.scheduled, 0);
    assert!(buffer.responses().is_empty());
}

#[rstest]
fn sandboxed_request_is_rejected_inline(idle_executor: MockExecutor) {
    let (worker, buffer) = worker_with(idle_executor);
    let request = WorkRequest::new(2, vec![String::from("a.cs")]).with_sandbox_dir("sandbox/2");

    let summary = worker.run(&mut *request_stream(&[request])).expect("run");

    assert_eq!(summary.rejected, 1);
    assert_eq!(
        buffer.responses(),
        vec![WorkResponse::failure(2, SANDBOX_UNSUPPORTED_MESSAGE)]
    );
}

#[test]
fn sandboxed_request_runs_when_sandboxing_is_enabled() {
    let (worker, buffer) = worker_with(echoing_executor());
    let worker = worker.with_multiplex_sandboxing(true);
    let request = WorkRequest::new(2, Vec::new()).with_sandbox_dir("sandbox/2");

    let summary = worker.run(&mut *request_stream(&[request])).expect("run");

    assert_eq!(summary.scheduled, 1);
    assert_eq!(
        buffer.responses(),
        vec![WorkResponse::completed(2, 0, "compiled")]
    );
}

#[test]
fn cancelled_request_answers_once_with_cancellation() {
    let (worker, buffer) = worker_with(blocking_executor());
    let stream = [
        WorkRequest::new(4, Vec::new()),
        WorkRequest::cancellation(4),
    ];

    let summary = worker.run(&mut *request_stream(&stream)).expect("run");

    assert_eq!(summary.scheduled, 1);
    assert_eq!(summary.cancellations, 1);
    let responses = buffer.responses();
    assert_eq!(responses.len(), 1);
    let [response] = responses.as_slice() else {
        panic!("expected a single response, got {responses:?}");
    };
    assert_eq!(response.request_id, 4);
    assert!(response.was_cancelled);
}

struct ExplodingExecutor;

impl RequestExecutor for ExplodingExecutor {
    fn execute(&self, _request: &WorkRequest, _token: &CancelToken) -> WorkResponse {
        panic!("compiler wrapper exploded");
    }
}

#[test]
fn executor_panic_becomes_failure_response() {
    let buffer = SharedBuffer::default();
    let worker = Worker::new(
        ExplodingExecutor,
        ResponseSink::new(WireFormat::Proto.writer(buffer.clone())),
    );

    worker
        .run(&mut *request_stream(&[WorkRequest::new(6, Vec::new())]))
        .expect("run");

    let responses = buffer.responses();
    let [response] = responses.as_slice() else {
        panic!("expected a single response, got {responses:?}");
    };
    assert_eq!(response.request_id, 6);
    assert_eq!(response.exit_code, INTERNAL_FAILURE_EXIT_CODE);
    assert!(response.output.contains("compiler wrapper exploded"));
}

#[rstest]
fn corrupt_stream_is_fatal(idle_executor: MockExecutor) {
    let (worker, buffer) = worker_with(idle_executor);
    let mut reader = WireFormat::Proto.reader(Cursor::new(vec![0x05, 0x0a]));

    let error = worker.run(&mut *reader).expect_err("truncated frame");

    assert!(matches!(
        error,
        WorkerError::Protocol {
            source: ProtocolError::Truncated { .. }
        }
    ));
    assert!(buffer.responses().is_empty());
}

/// Executor whose requests each wait for a partner request to arrive.
///
/// Every request reports `"met"` when another request reached the executor
/// while it was waiting, and `"alone"` once the timeout expires without one.
struct RendezvousExecutor {
    arrivals: Mutex<usize>,
    arrived: Condvar,
}

impl RendezvousExecutor {
    const PARTIES: usize = 2;
    const TIMEOUT: Duration = Duration::from_secs(10);

    fn new() -> Self {
        Self {
            arrivals: Mutex::new(0),
            arrived: Condvar::new(),
        }
    }
}

impl RequestExecutor for RendezvousExecutor {
    fn execute(&self, request: &WorkRequest, _token: &CancelToken) -> WorkResponse {
        let mut arrivals = self.arrivals.lock().unwrap_or_else(PoisonError::into_inner);
        *arrivals += 1;
        self.arrived.notify_all();
        let (_guard, timeout) = self
            .arrived
            .wait_timeout_while(arrivals, Self::TIMEOUT, |count| *count < Self::PARTIES)
            .unwrap_or_else(PoisonError::into_inner);
        let outcome = if timeout.timed_out() { "alone" } else { "met" };
        WorkResponse::completed(request.request_id, 0, outcome)
    }
}

#[test]
fn slow_request_does_not_block_later_requests() {
    let buffer = SharedBuffer::default();
    let worker = Worker::new(
        RendezvousExecutor::new(),
        ResponseSink::new(WireFormat::Proto.writer(buffer.clone())),
    );

    let stream = [WorkRequest::new(1, Vec::new()), WorkRequest::new(2, Vec::new())];
    worker.run(&mut *request_stream(&stream)).expect("run");

    let mut responses = buffer.responses();
    responses.sort_by_key(|response| response.request_id);
    assert_eq!(
        responses,
        vec![
            WorkResponse::completed(1, 0, "met"),
            WorkResponse::completed(2, 0, "met"),
        ]
    );
}

/// Executor that records how many of its requests overlap in time.
#[derive(Default)]
struct OverlapExecutor {
    active: AtomicUsize,
    peak: Arc<AtomicUsize>,
}

impl RequestExecutor for OverlapExecutor {
    fn execute(&self, request: &WorkRequest, _token: &CancelToken) -> WorkResponse {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        self.active.fetch_sub(1, Ordering::SeqCst);
        WorkResponse::completed(request.request_id, 0, format!("output {}", request.request_id))
    }
}

#[rstest]
#[case::unbounded(None, 24)]
#[case::bounded(Some(2), 2)]
fn concurrent_responses_are_complete(#[case] limit: Option<usize>, #[case] max_peak: usize) {
    let executor = OverlapExecutor::default();
    let peak = Arc::clone(&executor.peak);
    let buffer = SharedBuffer::default();
    let worker = Worker::new(
        executor,
        ResponseSink::new(WireFormat::Proto.writer(buffer.clone())),
    )
    .with_concurrency_limit(limit);

    let stream: Vec<WorkRequest> = (0..24).map(|id| WorkRequest::new(id, Vec::new())).collect();
    let summary = worker.run(&mut *request_stream(&stream)).expect("run");

    assert_eq!(summary.scheduled, 24);
    let mut responses = buffer.responses();
    responses.sort_by_key(|response| response.request_id);
    assert_eq!(responses.len(), 24);
    for (id, response) in (0..24).zip(&responses) {
        assert_eq!(response.request_id, id);
        assert_eq!(response.output, format!("output {id}"));
    }
    let observed = peak.load(Ordering::SeqCst);
    assert!(
        (2..=max_peak).contains(&observed),
        "expected between 2 and {max_peak} overlapping requests, saw {observed}"
    );
}

#[test]
fn panic_message_reads_string_payloads() {
    let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
    let borrowed: Box<dyn Any + Send> = Box::new("borrowed");
    let opaque: Box<dyn Any + Send> = Box::new(7_u8);

    assert_eq!(panic_message(owned.as_ref()), "owned");
    assert_eq!(panic_message(borrowed.as_ref()), "borrowed");
    assert_eq!(panic_message(opaque.as_ref()), "non-string panic payload");
}

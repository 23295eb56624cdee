//! Cancellation of in-flight requests.
//!
//! Each scheduled request is registered under its `request_id` with a
//! [`CancelToken`]. The executor attaches the compiler subprocess to the token
//! once it is spawned; a cancel message looks the token up and kills the
//! attached child. Reaping happens under the token's lock, so a kill can
//! never reach a recycled process id.

use std::collections::HashMap;
use std::io;
use std::process::{Child, ExitStatus};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::CANCELLATION_TARGET;

#[derive(Debug, Default)]
struct TokenState {
    cancelled: bool,
    child: Option<Child>,
}

/// Shared cancellation state for one request.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    state: Arc<Mutex<TokenState>>,
}

impl CancelToken {
    /// Creates a token that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TokenState> {
        // The state is plain data; a panic elsewhere cannot leave it torn.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns `true` once [`CancelToken::cancel`] has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.lock().cancelled
    }

    /// Marks the request cancelled and kills its subprocess, if attached.
    ///
    /// Returns `true` when a running subprocess was signalled.
    #[must_use]
    pub fn cancel(&self) -> bool {
        let mut state = self.lock();
        state.cancelled = true;
        let Some(child) = state.child.as_mut() else {
            return false;
        };
        match child.kill() {
            Ok(()) => true,
            Err(error) => {
                warn!(
                    target: CANCELLATION_TARGET,
                    pid = child.id(),
                    %error,
                    "failed to kill cancelled subprocess"
                );
                false
            }
        }
    }

    /// Kills the attached subprocess without marking the request cancelled.
    pub(crate) fn terminate(&self) {
        if let Some(child) = self.lock().child.as_mut() {
            drop(child.kill());
        }
    }

    /// Hands the spawned subprocess to the token.
    ///
    /// A token cancelled before the subprocess existed kills it immediately.
    pub fn attach(&self, mut child: Child) {
        let mut state = self.lock();
        if state.cancelled {
            debug!(
                target: CANCELLATION_TARGET,
                pid = child.id(),
                "request cancelled before spawn completed; killing subprocess"
            );
            drop(child.kill());
        }
        state.child = Some(child);
    }

    /// Polls the attached subprocess for exit without blocking.
    ///
    /// # Errors
    ///
    /// Returns an error when no subprocess is attached or the status query
    /// fails.
    pub fn try_wait(&self) -> io::Result<Option<ExitStatus>> {
        let mut state = self.lock();
        match state.child.as_mut() {
            Some(child) => child.try_wait(),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                "no subprocess attached to cancel token",
            )),
        }
    }

    /// Releases the subprocess handle once it has been reaped.
    #[must_use]
    pub fn detach(&self) -> Option<Child> {
        self.lock().child.take()
    }

    fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

/// Result of a cancel message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// A registered request was found and marked cancelled.
    Signalled {
        /// Whether a running subprocess was killed.
        killed: bool,
    },
    /// No request with that id is in flight; the message is dropped.
    Unknown,
}

/// Maps in-flight request ids to their cancel tokens.
#[derive(Debug, Clone, Default)]
pub struct CancellationRegistry {
    tasks: Arc<Mutex<HashMap<i32, CancelToken>>>,
}

impl CancellationRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<i32, CancelToken>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a new request and returns its token.
    ///
    /// A duplicate id replaces the earlier entry; the orchestrator must not
    /// reuse ids of outstanding requests.
    #[must_use]
    pub fn register(&self, request_id: i32) -> CancelToken {
        let token = CancelToken::new();
        if self.lock().insert(request_id, token.clone()).is_some() {
            warn!(
                target: CANCELLATION_TARGET,
                request_id,
                "request id reused while a request with the same id is in flight"
            );
        }
        token
    }

    /// Removes the entry for `request_id` if it still belongs to `token`.
    pub fn deregister(&self, request_id: i32, token: &CancelToken) {
        let mut tasks = self.lock();
        if tasks
            .get(&request_id)
            .is_some_and(|registered| registered.same_as(token))
        {
            tasks.remove(&request_id);
        }
    }

    /// Cancels the in-flight request with `request_id`, if any.
    #[must_use]
    pub fn cancel(&self, request_id: i32) -> CancelOutcome {
        let token = self.lock().get(&request_id).cloned();
        match token {
            Some(token) => CancelOutcome::Signalled {
                killed: token.cancel(),
            },
            None => CancelOutcome::Unknown,
        }
    }

    /// Returns the number of requests currently registered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` when no request is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

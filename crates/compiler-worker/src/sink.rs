//! Serialised access to the shared response stream.
//!
//! Standard output is the one piece of process-wide mutable state. Every
//! response, whether written inline by the dispatcher or by a request task,
//! goes through [`ResponseSink::write`], which holds a single mutex across
//! the whole frame encode so two responses can never interleave their bytes.
//! No ordering between responses is implied.

use std::sync::Mutex;

use thiserror::Error;

use worker_protocol::{FrameWriter, ProtocolError, WorkResponse};

/// Errors raised while emitting a response.
#[derive(Debug, Error)]
pub enum SinkError {
    /// A writer panicked mid-frame; the stream can no longer be trusted.
    #[error("response stream lock poisoned")]
    Poisoned,
    /// Encoding or writing the frame failed.
    #[error("failed to write response: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Mutex-guarded frame writer shared by all request tasks.
pub struct ResponseSink {
    writer: Mutex<Box<dyn FrameWriter + Send>>,
}

impl ResponseSink {
    /// Wraps the worker's frame writer.
    #[must_use]
    pub const fn new(writer: Box<dyn FrameWriter + Send>) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Writes one response as an uninterrupted frame.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Poisoned`] if an earlier writer panicked while
    /// holding the lock, or [`SinkError::Protocol`] when the write fails.
    pub fn write(&self, response: &WorkResponse) -> Result<(), SinkError> {
        let mut writer = self.writer.lock().map_err(|_| SinkError::Poisoned)?;
        writer.write_response(response)?;
        Ok(())
    }
}

impl std::fmt::Debug for ResponseSink {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.debug_struct("ResponseSink").finish_non_exhaustive()
    }
}

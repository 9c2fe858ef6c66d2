//! ---
//! oph_section: "01-core-functionality"
//! oph_subsection: "module"
//! oph_type: "source"
//! oph_scope: "code"
//! oph_description: "Checkpoint lock and timer services backing the harness."
//! oph_version: "v0.1.0"
//! oph_owner: "tbd"
//! ---
use std::fmt;

use parking_lot::Mutex;

/// Failure raised by an operator outside the calling thread.
#[derive(Debug)]
pub struct AsyncException {
    pub message: String,
    pub error: anyhow::Error,
}

impl fmt::Display for AsyncException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:#}", self.message, self.error)
    }
}

/// Sink for failures reported asynchronously, e.g. by a timer callback.
pub trait AsyncExceptionHandler: Send + Sync + fmt::Debug {
    fn handle_async_exception(&self, message: &str, error: anyhow::Error);
}

/// Default sink: asynchronous failures are dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpAsyncExceptionHandler;

impl AsyncExceptionHandler for NoOpAsyncExceptionHandler {
    fn handle_async_exception(&self, _message: &str, _error: anyhow::Error) {}
}

/// Sink keeping every reported failure for later inspection.
#[derive(Debug, Default)]
pub struct RecordingAsyncExceptionHandler {
    exceptions: Mutex<Vec<AsyncException>>,
}

impl RecordingAsyncExceptionHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.exceptions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.exceptions.lock().is_empty()
    }

    /// Rendered form of every recorded failure, oldest first.
    pub fn messages(&self) -> Vec<String> {
        self.exceptions
            .lock()
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    /// Remove and return all recorded failures.
    pub fn take(&self) -> Vec<AsyncException> {
        std::mem::take(&mut *self.exceptions.lock())
    }
}

impl AsyncExceptionHandler for RecordingAsyncExceptionHandler {
    fn handle_async_exception(&self, message: &str, error: anyhow::Error) {
        self.exceptions.lock().push(AsyncException {
            message: message.to_owned(),
            error,
        });
    }
}

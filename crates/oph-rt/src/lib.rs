//! ---
//! oph_section: "01-core-functionality"
//! oph_subsection: "module"
//! oph_type: "source"
//! oph_scope: "code"
//! oph_description: "Checkpoint lock and timer services backing the harness."
//! oph_version: "v0.1.0"
//! oph_owner: "tbd"
//! ---
//! Runtime services shared between the driving thread and the timer thread.
//!
//! The [`CheckpointLock`] is the single exclusion primitive: the harness holds
//! it around every operator call and every [`TimeServiceProvider`] holds it
//! around every timer firing.

pub mod exceptions;
pub mod lock;
pub mod manual;
pub mod scheduling;

pub use exceptions::{
    AsyncException, AsyncExceptionHandler, NoOpAsyncExceptionHandler,
    RecordingAsyncExceptionHandler,
};
pub use lock::{CheckpointLock, CheckpointLockGuard};
pub use manual::TestTimeServiceProvider;
pub use scheduling::{
    DefaultTimeServiceProvider, ScheduledTimer, TimeServiceProvider, Triggerable,
};

/// Result alias for timer service operations.
pub type Result<T> = std::result::Result<T, TimerError>;

/// Failures raised by time service providers.
#[derive(Debug, thiserror::Error)]
pub enum TimerError {
    #[error("time service has been shut down")]
    Terminated,
    #[error("failed to spawn timer thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("timer thread panicked")]
    WorkerPanicked,
}

/// Wall-clock milliseconds since the Unix epoch.
pub fn system_time_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

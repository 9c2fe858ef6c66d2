//! ---
//! oph_section: "03-logging"
//! oph_subsection: "module"
//! oph_type: "source"
//! oph_scope: "code"
//! oph_description: "Structured logging adapters and sinks."
//! oph_version: "v0.1.0"
//! oph_owner: "tbd"
//! ---
#![warn(missing_docs)]

use once_cell::sync::OnceCell;
use tracing::Level;
use tracing_subscriber::{fmt as subscriber_fmt, prelude::*, EnvFilter, Registry};

pub mod macros;

/// Environment variable consulted before `RUST_LOG`.
pub const LOG_ENV: &str = "OPH_LOG";

fn env_filter() -> EnvFilter {
    std::env::var(LOG_ENV)
        .ok()
        .and_then(|directive| EnvFilter::try_new(directive).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(Level::INFO.as_str()))
}

/// Output format of the installed subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    Pretty,
    /// One JSON object per event.
    Json,
}

static INSTALLED: OnceCell<LogFormat> = OnceCell::new();

/// Initialize a human-readable tracing subscriber for test runs.
///
/// Safe to call repeatedly; only the first call installs a subscriber.
pub fn init() {
    init_with(LogFormat::Pretty);
}

/// Initialize a JSON tracing subscriber, useful when harness output is
/// collected by CI tooling.
pub fn init_json() {
    init_with(LogFormat::Json);
}

/// Install a subscriber in the given format unless this crate already did.
/// Returns the format requested by the first call.
pub fn init_with(format: LogFormat) -> Option<LogFormat> {
    INSTALLED
        .get_or_init(|| {
            let installed = match format {
                LogFormat::Pretty => Registry::default()
                    .with(env_filter())
                    .with(subscriber_fmt::layer().with_test_writer())
                    .try_init(),
                LogFormat::Json => Registry::default()
                    .with(env_filter())
                    .with(subscriber_fmt::layer().json().with_test_writer())
                    .try_init(),
            };
            if installed.is_err() {
                tracing::debug!("a global tracing subscriber was already installed");
            }
            format
        });
    installed_format()
}

/// Format requested by the first initialization, if any.
pub fn installed_format() -> Option<LogFormat> {
    INSTALLED.get().copied()
}

/// Structured logging context propagated by the convenience macros.
#[derive(Debug, Default, Clone)]
pub struct LogContext<'a> {
    /// Task name the operator runs in.
    pub task: Option<&'a str>,
    /// Operator type name.
    pub operator: Option<&'a str>,
    /// Checkpoint identifier, when the event belongs to a checkpoint.
    pub checkpoint: Option<u64>,
    /// Parallel subtask index.
    pub subtask: Option<u32>,
}

impl<'a> LogContext<'a> {
    /// Create an empty logging context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a task name.
    pub fn with_task(mut self, task: &'a str) -> Self {
        self.task = Some(task);
        self
    }

    /// Attach an operator name.
    pub fn with_operator(mut self, operator: &'a str) -> Self {
        self.operator = Some(operator);
        self
    }

    /// Attach a checkpoint identifier.
    pub fn with_checkpoint(mut self, checkpoint: u64) -> Self {
        self.checkpoint = Some(checkpoint);
        self
    }

    /// Attach a subtask index.
    pub fn with_subtask(mut self, subtask: u32) -> Self {
        self.subtask = Some(subtask);
        self
    }
}

/// Outcome used when emitting lifecycle log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleOutcome {
    /// The lifecycle step completed.
    Success,
    /// The lifecycle step failed.
    Fault,
}

impl LifecycleOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            LifecycleOutcome::Success => "success",
            LifecycleOutcome::Fault => "fault",
        }
    }
}

/// Emit a standardized lifecycle event (`setup`, `open`, `snapshot`, ...)
/// with a success/fault outcome.
pub fn log_lifecycle_event(
    context: Option<&LogContext>,
    event: &str,
    message: &str,
    outcome: LifecycleOutcome,
) {
    let ctx = context.cloned().unwrap_or_default();
    match outcome {
        LifecycleOutcome::Success => tracing::debug!(
            event,
            outcome = outcome.as_str(),
            task = ctx.task.unwrap_or(""),
            operator = ctx.operator.unwrap_or(""),
            checkpoint = ctx.checkpoint.unwrap_or_default(),
            subtask = ctx.subtask.unwrap_or_default(),
            message = %message
        ),
        LifecycleOutcome::Fault => tracing::warn!(
            event,
            outcome = outcome.as_str(),
            task = ctx.task.unwrap_or(""),
            operator = ctx.operator.unwrap_or(""),
            checkpoint = ctx.checkpoint.unwrap_or_default(),
            subtask = ctx.subtask.unwrap_or_default(),
            message = %message
        ),
    }
}

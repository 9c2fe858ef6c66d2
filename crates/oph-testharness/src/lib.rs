//! ---
//! oph_section: "11-simulation"
//! oph_subsection: "01-bootstrap"
//! oph_type: "source"
//! oph_scope: "code"
//! oph_description: "Operator test harness controller and mock runtime."
//! oph_version: "v0.1.0"
//! oph_owner: "tbd"
//! ---
//! Test harness for a single [`OneInputStreamOperator`].
//!
//! The harness provides the operator with a mock runtime context, lets tests
//! push elements and watermarks into it, drives snapshot and restore against
//! a pluggable state backend, and captures everything the operator emits.
//!
//! [`OneInputStreamOperator`]: oph_operator::OneInputStreamOperator

pub mod context;
pub mod environment;
pub mod harness;
pub mod metrics;
pub mod output;
pub mod util;

pub use context::MockStreamTask;
pub use environment::{MockEnvironment, MockInputSplitProvider};
pub use harness::{HarnessOptions, HarnessState, OneInputStreamOperatorTestHarness};
pub use metrics::HarnessMetrics;
pub use output::{MockOutput, OutputCollector};

/// Result alias used throughout the harness crate.
pub type Result<T> = std::result::Result<T, HarnessError>;

/// Failures surfaced by harness calls.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// Snapshot or restore requested on an operator without the
    /// checkpointed-state capability.
    #[error("operator '{operator}' does not support checkpointed state")]
    NotCheckpointed { operator: String },
    /// A call that needs a set-up operator was made before `setup()`.
    #[error("operator has not been set up; call setup() or open() first")]
    NotSetUp,
    /// A processing call was made before `open()`.
    #[error("operator has not been opened; call open() first")]
    NotOpen,
    /// The harness configuration could not be loaded or is invalid.
    #[error("invalid harness configuration: {0:#}")]
    Config(anyhow::Error),
    #[error(transparent)]
    State(#[from] oph_state::StateError),
    #[error(transparent)]
    Timer(#[from] oph_rt::TimerError),
    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
    /// Failure raised by the operator itself, passed through untouched.
    #[error(transparent)]
    Operator(#[from] anyhow::Error),
}

impl HarnessError {
    /// The operator's own error, when this failure came from the operator.
    pub fn as_operator_error(&self) -> Option<&anyhow::Error> {
        match self {
            HarnessError::Operator(err) => Some(err),
            _ => None,
        }
    }

    pub fn into_operator_error(self) -> Option<anyhow::Error> {
        match self {
            HarnessError::Operator(err) => Some(err),
            _ => None,
        }
    }
}

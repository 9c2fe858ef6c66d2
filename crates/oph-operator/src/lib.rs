//! ---
//! oph_section: "05-operator-api"
//! oph_subsection: "module"
//! oph_type: "source"
//! oph_scope: "code"
//! oph_description: "Operator lifecycle contracts and stream element types."
//! oph_version: "v0.1.0"
//! oph_owner: "tbd"
//! ---
//! Contracts an operator implements to be driven by the test harness, plus
//! the element types that flow through it.

pub mod element;
pub mod operator;
pub mod output;
pub mod task;

pub use element::{StreamElement, StreamRecord, Watermark};
pub use operator::{
    operator_type_name, CheckpointedOperator, OneInputStreamOperator, StreamOperator,
};
pub use output::Output;
pub use task::{Environment, InputSplit, InputSplitProvider, StreamTask, UserCodeLoader};

pub use oph_common::{Configuration, ExecutionConfig, JobId, StreamConfig};
pub use oph_rt::{AsyncExceptionHandler, CheckpointLock, ScheduledTimer, TimeServiceProvider};
pub use oph_state::{CheckpointStateOutputStream, CheckpointStreamFactory, StateHandle};

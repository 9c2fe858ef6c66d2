//! ---
//! oph_section: "05-operator-api"
//! oph_subsection: "module"
//! oph_type: "source"
//! oph_scope: "code"
//! oph_description: "Operator lifecycle contracts and stream element types."
//! oph_version: "v0.1.0"
//! oph_owner: "tbd"
//! ---
use std::fmt;
use std::sync::Arc;

use oph_common::{Configuration, ExecutionConfig, JobId, StreamConfig};
use oph_rt::{CheckpointLock, ScheduledTimer, TimeServiceProvider};
use oph_state::CheckpointStreamFactory;
use serde::{Deserialize, Serialize};

/// Runtime context an operator receives at setup.
pub trait StreamTask: Send + Sync {
    fn name(&self) -> &str;

    /// Monitor guarding every operator call and timer firing.
    fn checkpoint_lock(&self) -> &CheckpointLock;

    fn configuration(&self) -> &StreamConfig;

    fn task_configuration(&self) -> &Configuration;

    fn environment(&self) -> &dyn Environment;

    fn execution_config(&self) -> &ExecutionConfig;

    fn user_code_loader(&self) -> &UserCodeLoader;

    /// Report a failure that happened outside the calling thread.
    fn register_async_exception(&self, message: &str, error: anyhow::Error);

    /// Stream factory for this operator's checkpoints, backed by the task's
    /// current state backend.
    fn create_checkpoint_stream_factory(&self) -> oph_state::Result<Box<dyn CheckpointStreamFactory>>;

    fn timer_service(&self) -> Arc<dyn TimeServiceProvider>;

    /// Schedule the operator's own `on_processing_time` hook.
    fn register_timer(&self, timestamp: i64) -> oph_rt::Result<ScheduledTimer>;
}

/// Static facts about the task slot an operator runs in.
pub trait Environment: Send + Sync + fmt::Debug {
    fn job_id(&self) -> JobId;

    fn task_name(&self) -> &str;

    /// Managed memory budget in bytes.
    fn memory_size(&self) -> u64;

    fn buffer_size(&self) -> usize;

    fn input_split_provider(&self) -> &dyn InputSplitProvider;

    fn task_configuration(&self) -> &Configuration;

    fn execution_config(&self) -> &ExecutionConfig;

    fn max_parallelism(&self) -> u32;

    fn parallelism(&self) -> u32;

    fn subtask_index(&self) -> u32;
}

/// Unit of source input assigned to a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSplit {
    pub split_number: u32,
    #[serde(default)]
    pub hostnames: Vec<String>,
}

/// Hands out input splits to source tasks.
pub trait InputSplitProvider: Send + Sync + fmt::Debug {
    fn next_input_split(&self) -> Option<InputSplit>;
}

/// Identity of the code unit user types are resolved from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCodeLoader {
    pub name: String,
    pub version: String,
}

impl UserCodeLoader {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for UserCodeLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

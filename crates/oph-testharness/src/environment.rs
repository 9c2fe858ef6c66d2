//! ---
//! oph_section: "11-simulation"
//! oph_subsection: "module"
//! oph_type: "source"
//! oph_scope: "code"
//! oph_description: "Mock task environment and input split source."
//! oph_version: "v0.1.0"
//! oph_owner: "tbd"
//! ---
use std::collections::VecDeque;
use std::sync::Arc;

use oph_common::{Configuration, ExecutionConfig, HarnessConfig, JobId, StreamConfig};
use oph_operator::{Environment, InputSplit, InputSplitProvider};
use parking_lot::Mutex;

/// Input split source handing out splits queued by the test, in order.
/// Empty unless the test adds splits.
#[derive(Debug, Default)]
pub struct MockInputSplitProvider {
    splits: Mutex<VecDeque<InputSplit>>,
}

impl MockInputSplitProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `count` local splits numbered from zero.
    pub fn add_input_splits(&self, count: u32) {
        let mut splits = self.splits.lock();
        let start = splits.len() as u32;
        splits.extend((start..start + count).map(|split_number| InputSplit {
            split_number,
            hostnames: vec!["localhost".to_owned()],
        }));
    }

    pub fn remaining(&self) -> usize {
        self.splits.lock().len()
    }
}

impl InputSplitProvider for MockInputSplitProvider {
    fn next_input_split(&self) -> Option<InputSplit> {
        self.splits.lock().pop_front()
    }
}

/// Environment with fixed facts taken from a [`HarnessConfig`].
#[derive(Debug)]
pub struct MockEnvironment {
    job_id: JobId,
    task_name: String,
    memory_size: u64,
    buffer_size: usize,
    max_parallelism: u32,
    parallelism: u32,
    subtask_index: u32,
    input_splits: MockInputSplitProvider,
    task_configuration: Configuration,
    execution_config: Arc<ExecutionConfig>,
}

impl MockEnvironment {
    /// `task_configuration` is the raw map behind the task's stream config.
    pub fn new(
        config: &HarnessConfig,
        task_configuration: Configuration,
        execution_config: Arc<ExecutionConfig>,
    ) -> Self {
        Self {
            job_id: JobId::generate(),
            task_name: config.task_name.clone(),
            memory_size: config.memory_size,
            buffer_size: config.buffer_size,
            max_parallelism: config.max_parallelism,
            parallelism: config.parallelism,
            subtask_index: config.subtask_index,
            input_splits: MockInputSplitProvider::new(),
            task_configuration,
            execution_config,
        }
    }

    pub fn input_splits(&self) -> &MockInputSplitProvider {
        &self.input_splits
    }

    pub fn execution_config_arc(&self) -> &Arc<ExecutionConfig> {
        &self.execution_config
    }
}

impl Environment for MockEnvironment {
    fn job_id(&self) -> JobId {
        self.job_id
    }

    fn task_name(&self) -> &str {
        &self.task_name
    }

    fn memory_size(&self) -> u64 {
        self.memory_size
    }

    fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    fn input_split_provider(&self) -> &dyn InputSplitProvider {
        &self.input_splits
    }

    fn task_configuration(&self) -> &Configuration {
        &self.task_configuration
    }

    fn execution_config(&self) -> &ExecutionConfig {
        &self.execution_config
    }

    fn max_parallelism(&self) -> u32 {
        self.max_parallelism
    }

    fn parallelism(&self) -> u32 {
        self.parallelism
    }

    fn subtask_index(&self) -> u32 {
        self.subtask_index
    }
}

//! ---
//! oph_section: "11-simulation"
//! oph_subsection: "module"
//! oph_type: "source"
//! oph_scope: "code"
//! oph_description: "Harness controller driving one operator through its lifecycle."
//! oph_version: "v0.1.0"
//! oph_owner: "tbd"
//! ---
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use oph_common::{Configuration, ExecutionConfig, HarnessConfig, StreamConfig};
use oph_logging::{log_lifecycle_event, oph_debug, LifecycleOutcome, LogContext};
use oph_operator::{
    operator_type_name, Environment, OneInputStreamOperator, StreamElement, StreamRecord,
    StreamTask, Watermark,
};
use oph_rt::{
    AsyncExceptionHandler, CheckpointLock, DefaultTimeServiceProvider,
    NoOpAsyncExceptionHandler, TestTimeServiceProvider, TimeServiceProvider, Triggerable,
};
use oph_state::{MemoryStateBackend, StateBackend, StateHandle};
use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

use crate::context::{BackendSlot, MockStreamTask, TimeServiceSlot};
use crate::environment::MockEnvironment;
use crate::metrics::HarnessMetrics;
use crate::output::{MockOutput, OutputCollector};
use crate::{HarnessError, Result};

/// Lifecycle position of the operator under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HarnessState {
    Uninitialized,
    SetUp,
    Open,
    /// Closed harnesses may be set up again.
    Closed,
}

impl HarnessState {
    pub fn as_str(&self) -> &'static str {
        match self {
            HarnessState::Uninitialized => "uninitialized",
            HarnessState::SetUp => "set_up",
            HarnessState::Open => "open",
            HarnessState::Closed => "closed",
        }
    }

    fn is_set_up(&self) -> bool {
        matches!(self, HarnessState::SetUp | HarnessState::Open)
    }
}

impl fmt::Display for HarnessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional collaborators for [`OneInputStreamOperatorTestHarness::with_options`].
///
/// Anything left unset falls back to a default: a fresh execution config, a
/// fresh checkpoint lock, a thread-backed time service, the built-in
/// [`HarnessConfig`], and a handler that drops async failures. Pass
/// `HarnessConfig::load()?` to honour `OPH_HARNESS_CONFIG`.
#[derive(Debug, Default)]
pub struct HarnessOptions {
    pub execution_config: Option<ExecutionConfig>,
    /// Ignored when `time_provider` is set, except that it must then be the
    /// provider's own lock.
    pub checkpoint_lock: Option<CheckpointLock>,
    /// Provider used instead of the thread-backed default. The harness adopts
    /// its checkpoint lock.
    pub time_provider: Option<Arc<dyn TimeServiceProvider>>,
    pub config: Option<HarnessConfig>,
    pub async_exception_handler: Option<Arc<dyn AsyncExceptionHandler>>,
}

impl HarnessOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn execution_config(mut self, config: ExecutionConfig) -> Self {
        self.execution_config = Some(config);
        self
    }

    pub fn checkpoint_lock(mut self, lock: CheckpointLock) -> Self {
        self.checkpoint_lock = Some(lock);
        self
    }

    pub fn time_provider(mut self, provider: Arc<dyn TimeServiceProvider>) -> Self {
        self.time_provider = Some(provider);
        self
    }

    pub fn config(mut self, config: HarnessConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn async_exception_handler(mut self, handler: Arc<dyn AsyncExceptionHandler>) -> Self {
        self.async_exception_handler = Some(handler);
        self
    }
}

/// Drives a single [`OneInputStreamOperator`] through setup, processing,
/// checkpointing, and shutdown, capturing everything it emits.
///
/// Every call into the operator runs on the calling thread while the
/// checkpoint lock is held. Timer callbacks take the same lock, so test code
/// holding [`checkpoint_lock`](Self::checkpoint_lock) keeps the operator
/// quiescent.
pub struct OneInputStreamOperatorTestHarness<IN, OUT, O> {
    operator: Arc<Mutex<O>>,
    operator_name: &'static str,
    config: HarnessConfig,
    execution_config: Arc<ExecutionConfig>,
    checkpoint_lock: CheckpointLock,
    environment: Arc<MockEnvironment>,
    task: Arc<MockStreamTask>,
    state_backend: BackendSlot,
    time_service: TimeServiceSlot,
    owns_time_service: bool,
    exceptions: Arc<dyn AsyncExceptionHandler>,
    output: OutputCollector<OUT>,
    metrics: Option<HarnessMetrics>,
    state: HarnessState,
    _input: PhantomData<fn(IN)>,
}

impl<IN, OUT, O> OneInputStreamOperatorTestHarness<IN, OUT, O>
where
    OUT: Clone + Send + 'static,
    O: OneInputStreamOperator<IN, OUT> + 'static,
{
    pub fn new(operator: O) -> Result<Self> {
        Self::with_options(operator, HarnessOptions::default())
    }

    /// Harness whose timers only fire when the returned provider's clock is
    /// advanced.
    pub fn with_manual_time(operator: O) -> Result<(Self, Arc<TestTimeServiceProvider>)> {
        let lock = CheckpointLock::new();
        let time = Arc::new(TestTimeServiceProvider::new(lock.clone()));
        let harness = Self::with_options(
            operator,
            HarnessOptions::new()
                .checkpoint_lock(lock)
                .time_provider(time.clone()),
        )?;
        Ok((harness, time))
    }

    pub fn with_options(operator: O, options: HarnessOptions) -> Result<Self> {
        let config = options.config.unwrap_or_default();
        config.validate().map_err(HarnessError::Config)?;
        let execution_config = Arc::new(options.execution_config.unwrap_or_default());
        let exceptions = options
            .async_exception_handler
            .unwrap_or_else(|| Arc::new(NoOpAsyncExceptionHandler));

        // An injected provider dictates the lock; timers must fire under the
        // same lock the harness holds.
        let (time_provider, owns_time_service, checkpoint_lock) = match options.time_provider {
            Some(provider) => {
                let provider_lock = provider.checkpoint_lock().clone();
                if let Some(lock) = &options.checkpoint_lock {
                    if !lock.ptr_eq(&provider_lock) {
                        return Err(HarnessError::Config(anyhow::anyhow!(
                            "time provider fires under a different checkpoint lock than the one supplied"
                        )));
                    }
                }
                (provider, false, provider_lock)
            }
            None => {
                let lock = options.checkpoint_lock.unwrap_or_default();
                let provider = default_time_service(&config, &lock, &exceptions)?;
                (provider, true, lock)
            }
        };
        let time_service: TimeServiceSlot = Arc::new(RwLock::new(time_provider));

        let backend: Arc<dyn StateBackend> =
            Arc::new(MemoryStateBackend::with_max_state_size(config.max_state_size));
        let state_backend: BackendSlot = Arc::new(RwLock::new(backend));

        let operator_name = operator_type_name::<O>();
        let operator = Arc::new(Mutex::new(operator));

        let mut stream_config = StreamConfig::new(Configuration::new());
        stream_config.set_checkpointing_enabled(config.checkpointing_enabled);
        stream_config.set_operator_name(operator_name);
        let environment = Arc::new(MockEnvironment::new(
            &config,
            stream_config.configuration().clone(),
            Arc::clone(&execution_config),
        ));

        let task = Arc::new(MockStreamTask::new(
            config.mock_task_name.clone(),
            operator_name.to_owned(),
            stream_config,
            Arc::clone(&environment),
            checkpoint_lock.clone(),
            Arc::clone(&exceptions),
            Arc::clone(&state_backend),
            Arc::clone(&time_service),
            operator_trigger::<IN, OUT, O>(&operator),
        ));

        Ok(Self {
            operator,
            operator_name,
            config,
            execution_config,
            checkpoint_lock,
            environment,
            task,
            state_backend,
            time_service,
            owns_time_service,
            exceptions,
            output: OutputCollector::new(),
            metrics: None,
            state: HarnessState::Uninitialized,
            _input: PhantomData,
        })
    }

    /// Replace the state backend used for snapshots and for the operator's
    /// own stream factories.
    pub fn set_state_backend(&mut self, backend: Arc<dyn StateBackend>) {
        *self.state_backend.write() = backend;
    }

    pub fn state_backend(&self) -> Arc<dyn StateBackend> {
        self.state_backend.read().clone()
    }

    /// Count processed and emitted elements. Takes effect for emissions at
    /// the next `setup()`.
    pub fn attach_metrics(&mut self, metrics: HarnessMetrics) {
        self.metrics = Some(metrics);
    }

    pub fn metrics(&self) -> Option<&HarnessMetrics> {
        self.metrics.as_ref()
    }

    pub fn checkpoint_lock(&self) -> &CheckpointLock {
        &self.checkpoint_lock
    }

    pub fn environment(&self) -> &MockEnvironment {
        &self.environment
    }

    pub fn task(&self) -> &MockStreamTask {
        &self.task
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn execution_config(&self) -> &ExecutionConfig {
        &self.execution_config
    }

    pub fn time_service(&self) -> Arc<dyn TimeServiceProvider> {
        self.time_service.read().clone()
    }

    pub fn state(&self) -> HarnessState {
        self.state
    }

    pub fn operator_name(&self) -> &'static str {
        self.operator_name
    }

    /// Everything captured so far, in emission order.
    pub fn output(&self) -> Vec<StreamElement<OUT>> {
        self.output.elements()
    }

    pub fn output_collector(&self) -> &OutputCollector<OUT> {
        &self.output
    }

    /// Captured records, watermarks skipped.
    pub fn extract_output_records(&self) -> Vec<StreamRecord<OUT>> {
        self.output.records()
    }

    pub fn extract_output_values(&self) -> Vec<OUT> {
        self.output
            .records()
            .into_iter()
            .map(StreamRecord::into_value)
            .collect()
    }

    pub fn clear_output(&self) {
        self.output.clear();
    }

    /// Run `f` against the operator while holding the checkpoint lock.
    ///
    /// The operator stays borrowed for the whole closure. Timers fired from
    /// inside it (by stepping a manual clock) fail instead of reaching the
    /// operator.
    pub fn with_operator<R>(&self, f: impl FnOnce(&mut O) -> R) -> R {
        let _guard = self.checkpoint_lock.lock();
        let mut operator = self.operator.lock();
        f(&mut operator)
    }

    /// Hand the operator its runtime context and a fresh output sink bound to
    /// the shared output list.
    pub fn setup(&mut self) -> Result<()> {
        self.ensure_time_service()?;

        let mut output = MockOutput::new(self.output.clone(), Arc::clone(&self.execution_config));
        if let Some(metrics) = &self.metrics {
            output = output.with_metrics(metrics.clone(), self.operator_name);
        }
        let task: Arc<dyn StreamTask> = self.task.clone();

        let result = {
            let _guard = self.checkpoint_lock.lock();
            self.operator
                .lock()
                .setup(task, self.task.configuration(), Box::new(output))
        };
        self.log_outcome("setup", None, &result);
        result?;
        self.state = HarnessState::SetUp;
        Ok(())
    }

    /// Open the operator, setting it up first when that has not happened.
    pub fn open(&mut self) -> Result<()> {
        if !self.state.is_set_up() {
            self.setup()?;
        }
        let result = {
            let _guard = self.checkpoint_lock.lock();
            self.operator.lock().open()
        };
        self.log_outcome("open", None, &result);
        result?;
        self.state = HarnessState::Open;
        Ok(())
    }

    pub fn process_element(&mut self, record: StreamRecord<IN>) -> Result<()> {
        self.process_elements(std::iter::once(record))
    }

    /// Push records through the key-context hook and then the element hook,
    /// in order, under a single acquisition of the checkpoint lock.
    pub fn process_elements<I>(&mut self, records: I) -> Result<()>
    where
        I: IntoIterator<Item = StreamRecord<IN>>,
    {
        self.require_open()?;
        let _guard = self.checkpoint_lock.lock();
        let mut operator = self.operator.lock();
        for record in records {
            operator.set_key_context_element1(&record)?;
            operator.process_element(record)?;
            if let Some(metrics) = &self.metrics {
                metrics.record_element(self.operator_name);
            }
        }
        Ok(())
    }

    pub fn process_watermark(&mut self, mark: Watermark) -> Result<()> {
        self.require_open()?;
        {
            let _guard = self.checkpoint_lock.lock();
            self.operator.lock().process_watermark(mark)?;
        }
        if let Some(metrics) = &self.metrics {
            metrics.record_watermark(self.operator_name);
        }
        Ok(())
    }

    /// Write the operator's state into a new checkpoint stream and seal it.
    ///
    /// Fails with [`HarnessError::NotCheckpointed`] before any stream is
    /// opened when the operator has no checkpointed state.
    pub fn snapshot(&mut self, checkpoint_id: u64, timestamp: i64) -> Result<StateHandle> {
        self.require_set_up()?;
        let result = self.write_snapshot(checkpoint_id, timestamp);
        match &result {
            Ok(handle) => {
                info!(
                    operator = self.operator_name,
                    checkpoint_id,
                    timestamp,
                    state_size = handle.state_size(),
                    "operator snapshot sealed"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_snapshot(self.operator_name, handle.state_size());
                }
            }
            Err(HarnessError::NotCheckpointed { .. }) => {}
            Err(err) => {
                warn!(
                    operator = self.operator_name,
                    checkpoint_id,
                    error = %err,
                    "operator snapshot failed"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_snapshot_failed(self.operator_name);
                }
            }
        }
        result
    }

    fn write_snapshot(&self, checkpoint_id: u64, timestamp: i64) -> Result<StateHandle> {
        let _guard = self.checkpoint_lock.lock();
        let mut operator = self.operator.lock();
        let checkpointed = operator
            .as_checkpointed()
            .ok_or_else(|| self.not_checkpointed())?;

        let backend = self.state_backend();
        let factory = backend.create_stream_factory(
            &self.environment.job_id(),
            &self.config.snapshot_operator_name,
        )?;
        // An unsealed stream is released when it drops on the error path.
        let mut stream = factory.create_checkpoint_state_output_stream(checkpoint_id, timestamp)?;
        checkpointed.snapshot_state(&mut *stream, checkpoint_id, timestamp)?;
        Ok(stream.close_and_get_handle()?)
    }

    /// Feed a previously sealed state handle back into the operator.
    pub fn restore(&mut self, handle: &StateHandle) -> Result<()> {
        self.require_set_up()?;
        let result = self.read_restore(handle);
        match &result {
            Ok(()) => {
                info!(
                    operator = self.operator_name,
                    state_size = handle.state_size(),
                    "operator state restored"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_restore(self.operator_name);
                }
            }
            Err(HarnessError::NotCheckpointed { .. }) => {}
            Err(err) => {
                warn!(
                    operator = self.operator_name,
                    state_size = handle.state_size(),
                    error = %err,
                    "operator restore failed"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_restore_failed(self.operator_name);
                }
            }
        }
        result
    }

    fn read_restore(&self, handle: &StateHandle) -> Result<()> {
        let _guard = self.checkpoint_lock.lock();
        let mut operator = self.operator.lock();
        let checkpointed = operator
            .as_checkpointed()
            .ok_or_else(|| self.not_checkpointed())?;
        let mut input = handle.open_input_stream()?;
        checkpointed.restore_state(&mut *input)?;
        Ok(())
    }

    pub fn notify_of_completed_checkpoint(&mut self, checkpoint_id: u64) -> Result<()> {
        self.require_set_up()?;
        let result = {
            let _guard = self.checkpoint_lock.lock();
            self.operator
                .lock()
                .notify_of_completed_checkpoint(checkpoint_id)
        };
        self.log_outcome("checkpoint_complete", Some(checkpoint_id), &result);
        Ok(result?)
    }

    /// Close and dispose the operator, then shut down the time service.
    ///
    /// The harness ends up closed even when a step fails; the first failure
    /// is returned. A closed harness can be set up and opened again.
    pub fn close(&mut self) -> Result<()> {
        let hooks = {
            let _guard = self.checkpoint_lock.lock();
            let mut operator = self.operator.lock();
            let closed = operator.close();
            let disposed = operator.dispose();
            closed.and(disposed)
        };
        self.log_outcome("close", None, &hooks);

        // Outside the lock: shutdown waits for an in-flight timer callback.
        let shutdown = self.time_service().shutdown_service();
        self.state = HarnessState::Closed;
        if let Err(err) = &shutdown {
            warn!(operator = self.operator_name, error = %err, "time service shutdown failed");
        }
        hooks?;
        shutdown?;
        Ok(())
    }

    fn require_set_up(&self) -> Result<()> {
        if self.state.is_set_up() {
            Ok(())
        } else {
            Err(HarnessError::NotSetUp)
        }
    }

    fn require_open(&self) -> Result<()> {
        match self.state {
            HarnessState::Open => Ok(()),
            _ => Err(HarnessError::NotOpen),
        }
    }

    fn not_checkpointed(&self) -> HarnessError {
        HarnessError::NotCheckpointed {
            operator: self.operator_name.to_owned(),
        }
    }

    /// Swap a retired default time service for a fresh one so a closed
    /// harness can schedule timers again. Injected providers are left alone.
    fn ensure_time_service(&self) -> Result<()> {
        if !self.owns_time_service {
            return Ok(());
        }
        let mut slot = self.time_service.write();
        if slot.is_terminated() {
            *slot = default_time_service(&self.config, &self.checkpoint_lock, &self.exceptions)?;
            oph_debug!(
                context = self.log_context(None),
                "replaced retired time service"
            );
        }
        Ok(())
    }

    fn log_context(&self, checkpoint: Option<u64>) -> LogContext<'_> {
        let context = LogContext::new()
            .with_task(&self.config.mock_task_name)
            .with_operator(self.operator_name)
            .with_subtask(self.config.subtask_index);
        match checkpoint {
            Some(id) => context.with_checkpoint(id),
            None => context,
        }
    }

    fn log_outcome<T>(&self, event: &str, checkpoint: Option<u64>, result: &anyhow::Result<T>) {
        let context = self.log_context(checkpoint);
        match result {
            Ok(_) => log_lifecycle_event(
                Some(&context),
                event,
                "operator hook completed",
                LifecycleOutcome::Success,
            ),
            Err(err) => log_lifecycle_event(
                Some(&context),
                event,
                &format!("{err:#}"),
                LifecycleOutcome::Fault,
            ),
        }
    }
}

impl<IN, OUT, O> fmt::Debug for OneInputStreamOperatorTestHarness<IN, OUT, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OneInputStreamOperatorTestHarness")
            .field("operator", &self.operator_name)
            .field("state", &self.state)
            .field("captured", &self.output.len())
            .field("task", &self.task)
            .finish_non_exhaustive()
    }
}

fn default_time_service(
    config: &HarnessConfig,
    lock: &CheckpointLock,
    exceptions: &Arc<dyn AsyncExceptionHandler>,
) -> Result<Arc<dyn TimeServiceProvider>> {
    let provider = DefaultTimeServiceProvider::create(
        lock.clone(),
        Arc::clone(exceptions),
        &config.timer_thread_name,
    )?;
    Ok(Arc::new(provider))
}

/// Callback firing the operator's processing-time hook. Holds the operator
/// weakly so pending timers never keep a dropped harness alive.
fn operator_trigger<IN, OUT, O>(operator: &Arc<Mutex<O>>) -> Arc<dyn Triggerable>
where
    O: OneInputStreamOperator<IN, OUT> + 'static,
{
    let operator = Arc::downgrade(operator);
    Arc::new(move |timestamp: i64| -> anyhow::Result<()> {
        let Some(operator) = operator.upgrade() else {
            return Ok(());
        };
        // Callers hold the checkpoint lock, so the cell is only ever busy when
        // this thread already borrowed it, e.g. from inside `with_operator`.
        let mut operator = operator.try_lock().ok_or_else(|| {
            anyhow::anyhow!(
                "timer at {timestamp} fired while the operator was already borrowed on this thread"
            )
        })?;
        operator.on_processing_time(timestamp)
    })
}

//! ---
//! oph_section: "11-simulation"
//! oph_subsection: "module"
//! oph_type: "source"
//! oph_scope: "code"
//! oph_description: "Mock stream task handed to the operator at setup."
//! oph_version: "v0.1.0"
//! oph_owner: "tbd"
//! ---
use std::sync::Arc;

use oph_common::{Configuration, ExecutionConfig, JobId, StreamConfig};
use oph_operator::{Environment, StreamTask, UserCodeLoader};
use oph_rt::{
    AsyncExceptionHandler, CheckpointLock, ScheduledTimer, TimeServiceProvider, Triggerable,
};
use oph_state::{CheckpointStreamFactory, StateBackend};
use parking_lot::RwLock;
use tracing::warn;

use crate::environment::MockEnvironment;

/// State backend slot shared by the harness and its task.
pub(crate) type BackendSlot = Arc<RwLock<Arc<dyn StateBackend>>>;

/// Time service slot shared by the harness and its task.
pub(crate) type TimeServiceSlot = Arc<RwLock<Arc<dyn TimeServiceProvider>>>;

/// Runtime context the harness gives its operator.
///
/// State backend and time service are read through shared slots, so changes
/// made on the harness are visible to the operator immediately.
pub struct MockStreamTask {
    name: String,
    operator_name: String,
    stream_config: StreamConfig,
    environment: Arc<MockEnvironment>,
    checkpoint_lock: CheckpointLock,
    user_code_loader: UserCodeLoader,
    exceptions: Arc<dyn AsyncExceptionHandler>,
    state_backend: BackendSlot,
    time_service: TimeServiceSlot,
    operator_trigger: Arc<dyn Triggerable>,
}

impl MockStreamTask {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        name: String,
        operator_name: String,
        stream_config: StreamConfig,
        environment: Arc<MockEnvironment>,
        checkpoint_lock: CheckpointLock,
        exceptions: Arc<dyn AsyncExceptionHandler>,
        state_backend: BackendSlot,
        time_service: TimeServiceSlot,
        operator_trigger: Arc<dyn Triggerable>,
    ) -> Self {
        Self {
            name,
            operator_name,
            stream_config,
            environment,
            checkpoint_lock,
            user_code_loader: UserCodeLoader::new(
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION"),
            ),
            exceptions,
            state_backend,
            time_service,
            operator_trigger,
        }
    }

    pub fn job_id(&self) -> JobId {
        self.environment.job_id()
    }

    pub fn state_backend(&self) -> Arc<dyn StateBackend> {
        self.state_backend.read().clone()
    }
}

impl StreamTask for MockStreamTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn checkpoint_lock(&self) -> &CheckpointLock {
        &self.checkpoint_lock
    }

    fn configuration(&self) -> &StreamConfig {
        &self.stream_config
    }

    fn task_configuration(&self) -> &Configuration {
        self.environment.task_configuration()
    }

    fn environment(&self) -> &dyn Environment {
        self.environment.as_ref()
    }

    fn execution_config(&self) -> &ExecutionConfig {
        self.environment.execution_config()
    }

    fn user_code_loader(&self) -> &UserCodeLoader {
        &self.user_code_loader
    }

    fn register_async_exception(&self, message: &str, error: anyhow::Error) {
        warn!(task = %self.name, error = %error, "{message}");
        self.exceptions.handle_async_exception(message, error);
    }

    fn create_checkpoint_stream_factory(
        &self,
    ) -> oph_state::Result<Box<dyn CheckpointStreamFactory>> {
        self.state_backend()
            .create_stream_factory(&self.job_id(), &self.operator_name)
    }

    fn timer_service(&self) -> Arc<dyn TimeServiceProvider> {
        self.time_service.read().clone()
    }

    fn register_timer(&self, timestamp: i64) -> oph_rt::Result<ScheduledTimer> {
        self.timer_service()
            .register_timer(timestamp, Arc::clone(&self.operator_trigger))
    }
}

impl std::fmt::Debug for MockStreamTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockStreamTask")
            .field("name", &self.name)
            .field("operator", &self.operator_name)
            .field("job_id", &self.job_id())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oph_common::HarnessConfig;
    use oph_rt::{RecordingAsyncExceptionHandler, TestTimeServiceProvider};
    use oph_state::MemoryStateBackend;
    use std::io::Write;
    use std::sync::atomic::{AtomicI64, Ordering};

    fn task_with(
        time: Arc<dyn TimeServiceProvider>,
        trigger: Arc<dyn Triggerable>,
        exceptions: Arc<dyn AsyncExceptionHandler>,
    ) -> MockStreamTask {
        let config = HarnessConfig::default();
        let stream_config = StreamConfig::default();
        let env = Arc::new(MockEnvironment::new(
            &config,
            stream_config.configuration().clone(),
            Arc::new(ExecutionConfig::new()),
        ));
        let backend: Arc<dyn StateBackend> = Arc::new(MemoryStateBackend::new());
        let lock = time.checkpoint_lock().clone();
        MockStreamTask::new(
            config.mock_task_name.clone(),
            "Counter".to_owned(),
            stream_config,
            env,
            lock,
            exceptions,
            Arc::new(RwLock::new(backend)),
            Arc::new(RwLock::new(time)),
            trigger,
        )
    }

    #[test]
    fn register_timer_routes_to_operator_trigger() {
        let lock = CheckpointLock::new();
        let time = Arc::new(TestTimeServiceProvider::new(lock));
        let fired = Arc::new(AtomicI64::new(0));
        let sink = Arc::clone(&fired);
        let trigger: Arc<dyn Triggerable> = Arc::new(move |ts: i64| -> anyhow::Result<()> {
            sink.store(ts, Ordering::SeqCst);
            Ok(())
        });
        let task = task_with(
            time.clone(),
            trigger,
            Arc::new(RecordingAsyncExceptionHandler::new()),
        );

        task.register_timer(30).unwrap();
        assert_eq!(task.timer_service().num_registered_timers(), 1);
        time.set_current_time(30).unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 30);
        assert_eq!(task.name(), "Mock Task");
    }

    #[test]
    fn async_exceptions_reach_the_handler() {
        let lock = CheckpointLock::new();
        let handler = Arc::new(RecordingAsyncExceptionHandler::new());
        let task = task_with(
            Arc::new(TestTimeServiceProvider::new(lock)),
            Arc::new(|_: i64| -> anyhow::Result<()> { Ok(()) }),
            handler.clone(),
        );
        task.register_async_exception("flush failed", anyhow::anyhow!("disk full"));
        assert_eq!(handler.messages(), vec!["flush failed: disk full".to_owned()]);
    }

    #[test]
    fn stream_factory_uses_current_backend() {
        let lock = CheckpointLock::new();
        let task = task_with(
            Arc::new(TestTimeServiceProvider::new(lock)),
            Arc::new(|_: i64| -> anyhow::Result<()> { Ok(()) }),
            Arc::new(RecordingAsyncExceptionHandler::new()),
        );
        let factory = task.create_checkpoint_stream_factory().unwrap();
        let mut stream = factory.create_checkpoint_state_output_stream(1, 10).unwrap();
        stream.write_all(b"abc").unwrap();
        let handle = stream.close_and_get_handle().unwrap();
        assert_eq!(handle.state_size(), 3);
        assert_eq!(task.user_code_loader().name, "oph-testharness");
    }
}

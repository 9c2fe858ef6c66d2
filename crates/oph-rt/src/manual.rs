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
use std::sync::Arc;

use parking_lot::Mutex;

use crate::lock::CheckpointLock;
use crate::scheduling::{ScheduledTimer, TimeServiceProvider, TimerQueue, Triggerable};
use crate::{Result, TimerError};

struct ManualClock {
    current_time: i64,
    queue: TimerQueue,
}

/// Deterministic time service driven by the test itself.
///
/// Time only moves through [`set_current_time`]; due timers fire on the
/// calling thread, in timestamp order, while holding the checkpoint lock.
///
/// [`set_current_time`]: TestTimeServiceProvider::set_current_time
pub struct TestTimeServiceProvider {
    lock: CheckpointLock,
    clock: Mutex<ManualClock>,
}

impl TestTimeServiceProvider {
    pub fn new(lock: CheckpointLock) -> Self {
        Self {
            lock,
            clock: Mutex::new(ManualClock {
                current_time: 0,
                queue: TimerQueue::default(),
            }),
        }
    }

    /// Advance (or rewind) processing time and fire every timer now due.
    ///
    /// A failing callback stops the sweep and its error is returned
    /// unchanged; later timers stay registered.
    pub fn set_current_time(&self, time: i64) -> anyhow::Result<()> {
        self.clock.lock().current_time = time;
        loop {
            let entry = {
                let mut clock = self.clock.lock();
                if clock.queue.terminated {
                    return Ok(());
                }
                let now = clock.current_time;
                match clock.queue.pop_due(now) {
                    Some(entry) => entry,
                    None => return Ok(()),
                }
            };
            if entry.is_cancelled() {
                continue;
            }
            let _guard = self.lock.lock();
            entry.target.trigger(entry.timestamp)?;
        }
    }
}

impl TimeServiceProvider for TestTimeServiceProvider {
    fn checkpoint_lock(&self) -> &CheckpointLock {
        &self.lock
    }

    fn current_processing_time(&self) -> i64 {
        self.clock.lock().current_time
    }

    fn register_timer(
        &self,
        timestamp: i64,
        target: Arc<dyn Triggerable>,
    ) -> Result<ScheduledTimer> {
        let mut clock = self.clock.lock();
        if clock.queue.terminated {
            return Err(TimerError::Terminated);
        }
        Ok(clock.queue.push(timestamp, target))
    }

    fn num_registered_timers(&self) -> usize {
        self.clock.lock().queue.pending()
    }

    fn is_terminated(&self) -> bool {
        self.clock.lock().queue.terminated
    }

    fn shutdown_service(&self) -> Result<()> {
        let mut clock = self.clock.lock();
        clock.queue.terminated = true;
        clock.queue.clear();
        Ok(())
    }
}

impl fmt::Debug for TestTimeServiceProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let clock = self.clock.lock();
        f.debug_struct("TestTimeServiceProvider")
            .field("current_time", &clock.current_time)
            .field("pending", &clock.queue.pending())
            .field("terminated", &clock.queue.terminated)
            .finish()
    }
}

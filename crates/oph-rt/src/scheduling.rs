//! ---
//! oph_section: "01-core-functionality"
//! oph_subsection: "module"
//! oph_type: "source"
//! oph_scope: "code"
//! oph_description: "Checkpoint lock and timer services backing the harness."
//! oph_version: "v0.1.0"
//! oph_owner: "tbd"
//! ---
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::exceptions::AsyncExceptionHandler;
use crate::lock::CheckpointLock;
use crate::{system_time_millis, Result, TimerError};

/// How long the timer thread waits for the checkpoint lock before checking
/// for shutdown again.
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Callback fired when a registered timer becomes due.
pub trait Triggerable: Send + Sync {
    fn trigger(&self, timestamp: i64) -> anyhow::Result<()>;
}

impl<F> Triggerable for F
where
    F: Fn(i64) -> anyhow::Result<()> + Send + Sync,
{
    fn trigger(&self, timestamp: i64) -> anyhow::Result<()> {
        self(timestamp)
    }
}

/// Schedules processing-time callbacks for the operator under test.
///
/// Implementations must hold the checkpoint lock while a callback runs and
/// must not fire anything once [`shutdown_service`] has returned.
///
/// [`shutdown_service`]: TimeServiceProvider::shutdown_service
pub trait TimeServiceProvider: Send + Sync + fmt::Debug {
    /// Lock held around every callback this provider fires.
    fn checkpoint_lock(&self) -> &CheckpointLock;

    /// Current processing time in milliseconds.
    fn current_processing_time(&self) -> i64;

    /// Fire `target` once processing time reaches `timestamp`.
    fn register_timer(&self, timestamp: i64, target: Arc<dyn Triggerable>)
        -> Result<ScheduledTimer>;

    /// Timers registered and not yet fired or cancelled.
    fn num_registered_timers(&self) -> usize;

    fn is_terminated(&self) -> bool;

    /// Stop accepting timers and retire any background work.
    fn shutdown_service(&self) -> Result<()>;
}

/// Handle to a registered timer.
#[derive(Debug, Clone)]
pub struct ScheduledTimer {
    timestamp: i64,
    cancelled: Arc<AtomicBool>,
}

impl ScheduledTimer {
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Prevent the timer from firing. Has no effect once it fired.
    pub fn cancel(&self) {
        self.cancelled.store(true, AtomicOrdering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(AtomicOrdering::SeqCst)
    }
}

pub(crate) struct TimerEntry {
    pub(crate) timestamp: i64,
    seq: u64,
    pub(crate) target: Arc<dyn Triggerable>,
    cancelled: Arc<AtomicBool>,
}

impl TimerEntry {
    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(AtomicOrdering::SeqCst)
    }
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.timestamp == other.timestamp && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.timestamp, self.seq).cmp(&(other.timestamp, other.seq))
    }
}

/// Min-heap of pending timers, ordered by timestamp then registration order.
#[derive(Default)]
pub(crate) struct TimerQueue {
    heap: BinaryHeap<Reverse<TimerEntry>>,
    next_seq: u64,
    pub(crate) terminated: bool,
}

impl TimerQueue {
    pub(crate) fn push(&mut self, timestamp: i64, target: Arc<dyn Triggerable>) -> ScheduledTimer {
        let cancelled = Arc::new(AtomicBool::new(false));
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(TimerEntry {
            timestamp,
            seq,
            target,
            cancelled: Arc::clone(&cancelled),
        }));
        ScheduledTimer {
            timestamp,
            cancelled,
        }
    }

    pub(crate) fn next_timestamp(&self) -> Option<i64> {
        self.heap.peek().map(|Reverse(entry)| entry.timestamp)
    }

    /// Pop the earliest timer if it is due at `now`.
    pub(crate) fn pop_due(&mut self, now: i64) -> Option<TimerEntry> {
        match self.next_timestamp() {
            Some(timestamp) if timestamp <= now => self.heap.pop().map(|Reverse(entry)| entry),
            _ => None,
        }
    }

    pub(crate) fn pending(&self) -> usize {
        self.heap
            .iter()
            .filter(|Reverse(entry)| !entry.is_cancelled())
            .count()
    }

    pub(crate) fn clear(&mut self) {
        self.heap.clear();
    }
}

struct Shared {
    queue: Mutex<TimerQueue>,
    wakeup: Condvar,
    lock: CheckpointLock,
    exceptions: Arc<dyn AsyncExceptionHandler>,
}

impl Shared {
    fn is_terminated(&self) -> bool {
        self.queue.lock().terminated
    }
}

/// Time service backed by one dedicated scheduling thread.
pub struct DefaultTimeServiceProvider {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DefaultTimeServiceProvider {
    /// Spawn the scheduling thread. Callbacks fire under `lock`; callback
    /// failures are reported to `exceptions`.
    pub fn create(
        lock: CheckpointLock,
        exceptions: Arc<dyn AsyncExceptionHandler>,
        thread_name: &str,
    ) -> Result<Self> {
        let shared = Arc::new(Shared {
            queue: Mutex::new(TimerQueue::default()),
            wakeup: Condvar::new(),
            lock,
            exceptions,
        });
        let worker_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(thread_name.to_owned())
            .spawn(move || run_worker(worker_shared))
            .map_err(TimerError::Spawn)?;
        debug!(thread = thread_name, "timer thread started");
        Ok(Self {
            shared,
            worker: Mutex::new(Some(handle)),
        })
    }
}

fn run_worker(shared: Arc<Shared>) {
    while let Some(entry) = next_due(&shared) {
        if entry.is_cancelled() {
            continue;
        }
        let guard = loop {
            if shared.is_terminated() {
                return;
            }
            if let Some(guard) = shared.lock.try_lock_for(LOCK_POLL_INTERVAL) {
                break guard;
            }
        };
        // Shutdown may have completed while we waited for the lock.
        if shared.is_terminated() {
            return;
        }
        if let Err(err) = entry.target.trigger(entry.timestamp) {
            warn!(timestamp = entry.timestamp, error = %err, "timer callback failed");
            shared
                .exceptions
                .handle_async_exception("Caught exception while processing timer", err);
        }
        drop(guard);
    }
    debug!("timer thread exiting");
}

/// Block until the earliest timer is due. Returns `None` on shutdown.
fn next_due(shared: &Shared) -> Option<TimerEntry> {
    let mut queue = shared.queue.lock();
    loop {
        if queue.terminated {
            return None;
        }
        let now = system_time_millis();
        if let Some(entry) = queue.pop_due(now) {
            return Some(entry);
        }
        match queue.next_timestamp() {
            Some(timestamp) => {
                let wait = Duration::from_millis(timestamp.saturating_sub(now).max(1) as u64);
                shared.wakeup.wait_for(&mut queue, wait);
            }
            None => shared.wakeup.wait(&mut queue),
        }
    }
}

impl TimeServiceProvider for DefaultTimeServiceProvider {
    fn checkpoint_lock(&self) -> &CheckpointLock {
        &self.shared.lock
    }

    fn current_processing_time(&self) -> i64 {
        system_time_millis()
    }

    fn register_timer(
        &self,
        timestamp: i64,
        target: Arc<dyn Triggerable>,
    ) -> Result<ScheduledTimer> {
        let mut queue = self.shared.queue.lock();
        if queue.terminated {
            return Err(TimerError::Terminated);
        }
        let timer = queue.push(timestamp, target);
        self.shared.wakeup.notify_one();
        Ok(timer)
    }

    fn num_registered_timers(&self) -> usize {
        self.shared.queue.lock().pending()
    }

    fn is_terminated(&self) -> bool {
        self.shared.is_terminated()
    }

    fn shutdown_service(&self) -> Result<()> {
        {
            let mut queue = self.shared.queue.lock();
            queue.terminated = true;
            queue.clear();
        }
        self.shared.wakeup.notify_all();

        let handle = self.worker.lock().take();
        match handle {
            Some(handle) if handle.thread().id() == thread::current().id() => {
                // Shut down from inside a callback; the loop exits on return.
                Ok(())
            }
            Some(handle) => {
                handle.join().map_err(|_| TimerError::WorkerPanicked)?;
                debug!("timer thread stopped");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl fmt::Debug for DefaultTimeServiceProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let queue = self.shared.queue.lock();
        f.debug_struct("DefaultTimeServiceProvider")
            .field("pending", &queue.pending())
            .field("terminated", &queue.terminated)
            .finish()
    }
}

impl Drop for DefaultTimeServiceProvider {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown_service() {
            warn!(error = %err, "timer service shutdown on drop failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exceptions::{NoOpAsyncExceptionHandler, RecordingAsyncExceptionHandler};
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;

    fn provider(lock: &CheckpointLock) -> DefaultTimeServiceProvider {
        DefaultTimeServiceProvider::create(
            lock.clone(),
            Arc::new(NoOpAsyncExceptionHandler),
            "oph-timer-test",
        )
        .unwrap()
    }

    #[test]
    fn due_timer_fires_under_checkpoint_lock() {
        let lock = CheckpointLock::new();
        let service = provider(&lock);
        let (tx, rx) = mpsc::channel();
        let held = lock.clone();
        let tx = Mutex::new(tx);
        service
            .register_timer(
                service.current_processing_time(),
                Arc::new(move |ts: i64| -> anyhow::Result<()> {
                    tx.lock().send((ts, held.is_locked())).unwrap();
                    Ok(())
                }),
            )
            .unwrap();

        let (_, locked) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(locked);
        service.shutdown_service().unwrap();
    }

    #[test]
    fn held_lock_blocks_firing() {
        let lock = CheckpointLock::new();
        let service = provider(&lock);
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);

        let guard = lock.lock();
        service
            .register_timer(
                0,
                Arc::new(move |_ts: i64| -> anyhow::Result<()> {
                    counter.fetch_add(1, AtomicOrdering::SeqCst);
                    Ok(())
                }),
            )
            .unwrap();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(fired.load(AtomicOrdering::SeqCst), 0);
        drop(guard);

        for _ in 0..500 {
            if fired.load(AtomicOrdering::SeqCst) == 1 {
                break;
            }
            thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(fired.load(AtomicOrdering::SeqCst), 1);
        service.shutdown_service().unwrap();
    }

    #[test]
    fn shutdown_while_lock_held_prevents_pending_fire() {
        let lock = CheckpointLock::new();
        let service = provider(&lock);
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);

        let guard = lock.lock();
        service
            .register_timer(
                0,
                Arc::new(move |_ts: i64| -> anyhow::Result<()> {
                    counter.fetch_add(1, AtomicOrdering::SeqCst);
                    Ok(())
                }),
            )
            .unwrap();
        thread::sleep(Duration::from_millis(30));
        service.shutdown_service().unwrap();
        drop(guard);

        thread::sleep(Duration::from_millis(30));
        assert_eq!(fired.load(AtomicOrdering::SeqCst), 0);
        assert!(service.is_terminated());
    }

    #[test]
    fn registration_after_shutdown_is_rejected() {
        let lock = CheckpointLock::new();
        let service = provider(&lock);
        service.shutdown_service().unwrap();
        service.shutdown_service().unwrap();
        let result = service.register_timer(0, Arc::new(|_ts: i64| -> anyhow::Result<()> { Ok(()) }));
        assert!(matches!(result, Err(TimerError::Terminated)));
    }

    #[test]
    fn cancelled_timer_does_not_fire() {
        let lock = CheckpointLock::new();
        let service = provider(&lock);
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let far_future = service.current_processing_time() + 60_000;
        let timer = service
            .register_timer(
                far_future,
                Arc::new(move |_ts: i64| -> anyhow::Result<()> {
                    counter.fetch_add(1, AtomicOrdering::SeqCst);
                    Ok(())
                }),
            )
            .unwrap();
        assert_eq!(service.num_registered_timers(), 1);
        timer.cancel();
        assert_eq!(service.num_registered_timers(), 0);
        service.shutdown_service().unwrap();
        assert_eq!(fired.load(AtomicOrdering::SeqCst), 0);
    }

    #[test]
    fn callback_failures_reach_the_exception_handler() {
        let lock = CheckpointLock::new();
        let handler = Arc::new(RecordingAsyncExceptionHandler::new());
        let service =
            DefaultTimeServiceProvider::create(lock, handler.clone(), "oph-timer-test").unwrap();
        service
            .register_timer(0, Arc::new(|_ts: i64| -> anyhow::Result<()> { Err(anyhow::anyhow!("boom")) }))
            .unwrap();

        for _ in 0..500 {
            if !handler.is_empty() {
                break;
            }
            thread::sleep(Duration::from_millis(2));
        }
        service.shutdown_service().unwrap();
        let messages = handler.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].ends_with("boom"));
    }
}

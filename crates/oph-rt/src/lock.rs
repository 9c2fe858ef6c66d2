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
use std::time::Duration;

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};

/// Guard returned while the checkpoint lock is held.
pub type CheckpointLockGuard<'a> = ReentrantMutexGuard<'a, ()>;

/// The shared exclusion object coordinating operator calls and timer firings.
///
/// Cloning yields another reference to the same monitor. The lock is
/// reentrant so code already holding it may call back into the harness.
#[derive(Clone, Default)]
pub struct CheckpointLock {
    inner: Arc<ReentrantMutex<()>>,
}

impl CheckpointLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> CheckpointLockGuard<'_> {
        self.inner.lock()
    }

    pub fn try_lock(&self) -> Option<CheckpointLockGuard<'_>> {
        self.inner.try_lock()
    }

    pub fn try_lock_for(&self, timeout: Duration) -> Option<CheckpointLockGuard<'_>> {
        self.inner.try_lock_for(timeout)
    }

    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }

    /// Whether both handles refer to the same monitor.
    pub fn ptr_eq(&self, other: &CheckpointLock) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for CheckpointLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckpointLock")
            .field("locked", &self.is_locked())
            .finish()
    }
}

//! Recovery trigger registration.

use crate::error::{EngineError, EngineResult};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// A host capability that wakes the engine once connectivity returns.
///
/// Registration is best-effort. A host without the capability simply has no
/// `BackgroundSync`, and queued entries wait for an explicit drain request.
pub trait BackgroundSync: Send + Sync {
    /// Asks the host to deliver a sync event tagged `tag` when back online.
    ///
    /// Registering the same tag twice coalesces into one pending event.
    fn register(&self, tag: &str) -> EngineResult<()>;
}

/// Records registrations instead of scheduling anything.
#[derive(Debug, Default)]
pub struct RecordingBackgroundSync {
    pending: Mutex<Vec<String>>,
    registrations: Mutex<u64>,
    failing: AtomicBool,
}

impl RecordingBackgroundSync {
    /// Creates a recorder with nothing pending.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later registration fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Returns the tags waiting to fire.
    pub fn pending(&self) -> Vec<String> {
        self.pending.lock().clone()
    }

    /// Returns how many registrations succeeded, counting repeats.
    pub fn registrations(&self) -> u64 {
        *self.registrations.lock()
    }

    /// Removes and returns the pending tags, as the host does when it fires them.
    pub fn take_pending(&self) -> Vec<String> {
        std::mem::take(&mut *self.pending.lock())
    }
}

impl BackgroundSync for RecordingBackgroundSync {
    fn register(&self, tag: &str) -> EngineResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(EngineError::TriggerUnavailable("registration refused".into()));
        }
        let mut pending = self.pending.lock();
        if !pending.iter().any(|t| t == tag) {
            pending.push(tag.to_string());
        }
        *self.registrations.lock() += 1;
        Ok(())
    }
}

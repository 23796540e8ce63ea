// Timer module: deferred callbacks for the invocation scheduler

pub mod delay;
pub mod frame;
pub mod manual;

pub use delay::DelayTimer;
pub use frame::FrameTimer;
pub use manual::ManualTimer;

use std::time::Duration;

/// Callback run when a timer fires
pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// Opaque token identifying a scheduled callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

impl TimerHandle {
    pub const fn from_raw(id: u64) -> Self {
        Self(id)
    }

    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

/// Deferred-callback capability injected into a scheduler
///
/// Implementations must never run the callback from inside `schedule_after`,
/// and firing and cancellation must be mutually exclusive for a handle:
/// once `cancel` returns, a callback that has not started will not run.
pub trait Timer: Send + Sync {
    /// Run `callback` once after `delay`
    fn schedule_after(&self, delay: Duration, callback: TimerCallback) -> TimerHandle;

    /// Prevent a scheduled callback from firing; unknown or fired handles are ignored
    fn cancel(&self, handle: TimerHandle);
}

/// Lock a mutex, recovering the guard if a panicking callback poisoned it
pub(crate) fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

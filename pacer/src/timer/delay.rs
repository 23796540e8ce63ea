// Delay-paced timer backed by the tokio runtime

use super::{lock, Timer, TimerCallback, TimerHandle};
use crate::errors::TimerError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::trace;

/// Runs each callback on a tokio task after `tokio::time::sleep(delay)`
///
/// A callback fires only if it can still remove its own entry from the live
/// map; `cancel` removes the entry first, so firing and cancellation never
/// both succeed for the same handle.
#[derive(Debug)]
pub struct DelayTimer {
    runtime: Handle,
    next_id: AtomicU64,
    live: Arc<Mutex<HashMap<u64, JoinHandle<()>>>>,
}

impl DelayTimer {
    /// Create a timer on the current tokio runtime
    ///
    /// Fails when called outside a runtime context.
    pub fn new() -> Result<Self, TimerError> {
        Handle::try_current()
            .map(Self::with_handle)
            .map_err(|e| TimerError::NoRuntime(e.to_string()))
    }

    /// Create a timer that spawns onto the given runtime
    pub fn with_handle(runtime: Handle) -> Self {
        Self {
            runtime,
            next_id: AtomicU64::new(1),
            live: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of callbacks scheduled and not yet fired or cancelled
    pub fn live_count(&self) -> usize {
        lock(&self.live).len()
    }
}

impl Timer for DelayTimer {
    fn schedule_after(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let live = Arc::clone(&self.live);

        // Holding the map lock across spawn keeps a zero-delay task from
        // looking up its entry before it is inserted.
        let mut entries = lock(&self.live);
        let task = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let claimed = lock(&live).remove(&id).is_some();
            if claimed {
                trace!(timer_id = id, "Delay timer fired");
                callback();
            }
        });
        entries.insert(id, task);

        TimerHandle::from_raw(id)
    }

    fn cancel(&self, handle: TimerHandle) {
        if let Some(task) = lock(&self.live).remove(&handle.as_raw()) {
            trace!(timer_id = handle.as_raw(), "Delay timer cancelled");
            task.abort();
        }
    }
}

impl Drop for DelayTimer {
    fn drop(&mut self) {
        for (_, task) in lock(&self.live).drain() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter_callback(counter: &Arc<AtomicUsize>) -> TimerCallback {
        let counter = Arc::clone(counter);
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_new_outside_runtime_fails() {
        let result = DelayTimer::new();
        assert!(matches!(result, Err(TimerError::NoRuntime(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_delay() {
        let timer = DelayTimer::new().unwrap();
        let fired = Arc::new(AtomicUsize::new(0));

        timer.schedule_after(Duration::from_millis(100), counter_callback(&fired));
        assert_eq!(timer.live_count(), 1);

        tokio::time::sleep(Duration::from_millis(99)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(timer.live_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_firing() {
        let timer = DelayTimer::new().unwrap();
        let fired = Arc::new(AtomicUsize::new(0));

        let handle = timer.schedule_after(Duration::from_millis(50), counter_callback(&fired));
        timer.cancel(handle);
        // Cancelling twice is harmless
        timer.cancel(handle);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(timer.live_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_delay_fires_on_next_turn() {
        let timer = DelayTimer::new().unwrap();
        let fired = Arc::new(AtomicUsize::new(0));

        timer.schedule_after(Duration::ZERO, counter_callback(&fired));
        // Never synchronously
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}

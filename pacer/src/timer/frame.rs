// Frame-paced timer: callbacks run on the next frame tick regardless of delay

use super::{lock, Timer, TimerCallback, TimerHandle};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::trace;

/// Queues callbacks until the host advances a frame with [`FrameTimer::tick`]
///
/// The requested delay is ignored: every callback scheduled before a tick
/// runs during that tick. Callbacks scheduled while a tick is running wait
/// for the following frame.
#[derive(Default)]
pub struct FrameTimer {
    next_id: AtomicU64,
    queue: Mutex<Vec<(u64, TimerCallback)>>,
}

impl FrameTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every callback queued before this frame; returns how many fired
    ///
    /// Callbacks are popped one at a time, so one cancelled by an earlier
    /// callback of the same frame does not run.
    pub fn tick(&self) -> usize {
        let frame_end = self.next_id.load(Ordering::Relaxed);
        let mut fired = 0;
        while let Some((id, callback)) = self.pop_before(frame_end) {
            trace!(timer_id = id, "Frame timer fired");
            callback();
            fired += 1;
        }
        fired
    }

    fn pop_before(&self, frame_end: u64) -> Option<(u64, TimerCallback)> {
        let mut queue = lock(&self.queue);
        let index = queue.iter().position(|(id, _)| *id < frame_end)?;
        Some(queue.remove(index))
    }

    /// Number of callbacks waiting for the next frame
    pub fn queued(&self) -> usize {
        lock(&self.queue).len()
    }

    /// Drive ticks from a tokio interval with the given frame period
    ///
    /// Must be called from within a tokio runtime. Abort the returned task
    /// to stop pacing.
    pub fn spawn_paced(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let timer = Arc::clone(self);
        tokio::spawn(async move {
            let mut frames = tokio::time::interval(period);
            frames.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                frames.tick().await;
                timer.tick();
            }
        })
    }
}

impl Timer for FrameTimer {
    fn schedule_after(&self, _delay: Duration, callback: TimerCallback) -> TimerHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.queue).push((id, callback));
        TimerHandle::from_raw(id)
    }

    fn cancel(&self, handle: TimerHandle) {
        lock(&self.queue).retain(|(id, _)| *id != handle.as_raw());
    }
}

impl std::fmt::Debug for FrameTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameTimer")
            .field("queued", &self.queued())
            .finish()
    }
}

// Virtual-time timer driven explicitly by tests and trace replay

use super::{lock, Timer, TimerCallback, TimerHandle};
use crate::clock::{duration_to_millis, Clock, ManualClock, Timestamp};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

struct Entry {
    id: u64,
    due: Timestamp,
    callback: TimerCallback,
}

/// Timer bound to a [`ManualClock`]; nothing fires until time is advanced
///
/// Advancing fires due callbacks in `(deadline, scheduling order)` order and
/// moves the clock to each deadline before running its callback, so the
/// callback observes the instant it was due at. Callbacks may schedule new
/// timers; those fire in the same advance if they fall due within it.
pub struct ManualTimer {
    clock: ManualClock,
    next_id: AtomicU64,
    entries: Mutex<Vec<Entry>>,
}

impl ManualTimer {
    pub fn new(clock: ManualClock) -> Self {
        Self {
            clock,
            next_id: AtomicU64::new(1),
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    /// Number of callbacks waiting to fire
    pub fn scheduled(&self) -> usize {
        lock(&self.entries).len()
    }

    /// Earliest pending deadline, if any
    pub fn next_deadline(&self) -> Option<Timestamp> {
        lock(&self.entries).iter().map(|e| e.due).min()
    }

    /// Advance the clock by `millis`, firing everything due on the way
    pub fn advance(&self, millis: i64) -> usize {
        let target = self.clock.now().saturating_add(millis);
        self.advance_to(target)
    }

    /// Advance the clock to `target`, firing everything due on the way
    ///
    /// A target in the past still fires entries already due but never moves
    /// the clock backward. Returns how many callbacks fired.
    pub fn advance_to(&self, target: Timestamp) -> usize {
        let mut fired = 0;
        while let Some(entry) = self.pop_due(target) {
            if entry.due > self.clock.now() {
                self.clock.set(entry.due);
            }
            (entry.callback)();
            fired += 1;
        }
        if target > self.clock.now() {
            self.clock.set(target);
        }
        fired
    }

    /// Keep advancing to the next deadline until no timer is scheduled
    ///
    /// Stops after `max_firings` callbacks to bound self-rescheduling loops.
    pub fn run_until_idle(&self, max_firings: usize) -> usize {
        let mut fired = 0;
        while fired < max_firings {
            let Some(due) = self.next_deadline() else {
                break;
            };
            let Some(entry) = self.pop_due(due) else {
                break;
            };
            if entry.due > self.clock.now() {
                self.clock.set(entry.due);
            }
            (entry.callback)();
            fired += 1;
        }
        fired
    }

    fn pop_due(&self, target: Timestamp) -> Option<Entry> {
        let mut entries = lock(&self.entries);
        let index = entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.due <= target)
            .min_by_key(|(_, e)| (e.due, e.id))
            .map(|(i, _)| i)?;
        Some(entries.remove(index))
    }
}

impl Timer for ManualTimer {
    fn schedule_after(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let due = self.clock.now().saturating_add(duration_to_millis(delay));
        lock(&self.entries).push(Entry { id, due, callback });
        TimerHandle::from_raw(id)
    }

    fn cancel(&self, handle: TimerHandle) {
        lock(&self.entries).retain(|e| e.id != handle.as_raw());
    }
}

impl std::fmt::Debug for ManualTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualTimer")
            .field("now", &self.clock.now())
            .field("scheduled", &self.scheduled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn recording_callback(log: &Arc<Mutex<Vec<(String, Timestamp)>>>, clock: &ManualClock, label: &str) -> TimerCallback {
        let log = Arc::clone(log);
        let clock = clock.clone();
        let label = label.to_string();
        Box::new(move || {
            log.lock().unwrap().push((label, clock.now()));
        })
    }

    #[test]
    fn test_fires_in_deadline_order_at_deadline() {
        let clock = ManualClock::new();
        let timer = ManualTimer::new(clock.clone());
        let log = Arc::new(Mutex::new(Vec::new()));

        timer.schedule_after(Duration::from_millis(30), recording_callback(&log, &clock, "b"));
        timer.schedule_after(Duration::from_millis(10), recording_callback(&log, &clock, "a"));
        timer.schedule_after(Duration::from_millis(30), recording_callback(&log, &clock, "c"));

        assert_eq!(timer.advance(25), 1);
        assert_eq!(clock.now(), 25);
        assert_eq!(timer.advance(100), 2);
        assert_eq!(clock.now(), 125);

        let log = log.lock().unwrap();
        assert_eq!(
            *log,
            vec![
                ("a".to_string(), 10),
                ("b".to_string(), 30),
                ("c".to_string(), 30)
            ]
        );
    }

    #[test]
    fn test_cancel_prevents_firing() {
        let clock = ManualClock::new();
        let timer = ManualTimer::new(clock.clone());
        let log = Arc::new(Mutex::new(Vec::new()));

        let handle = timer.schedule_after(Duration::from_millis(10), recording_callback(&log, &clock, "a"));
        timer.cancel(handle);

        assert_eq!(timer.advance(50), 0);
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(timer.scheduled(), 0);
    }

    #[test]
    fn test_callbacks_can_reschedule_within_same_advance() {
        let clock = ManualClock::new();
        let timer = Arc::new(ManualTimer::new(clock.clone()));
        let log = Arc::new(Mutex::new(Vec::new()));

        let inner_timer = Arc::clone(&timer);
        let inner_log = Arc::clone(&log);
        let inner_clock = clock.clone();
        timer.schedule_after(
            Duration::from_millis(10),
            Box::new(move || {
                let callback = recording_callback(&inner_log, &inner_clock, "second");
                inner_timer.schedule_after(Duration::from_millis(15), callback);
            }),
        );

        assert_eq!(timer.advance(100), 2);
        assert_eq!(*log.lock().unwrap(), vec![("second".to_string(), 25)]);
    }

    #[test]
    fn test_run_until_idle_and_next_deadline() {
        let clock = ManualClock::starting_at(1_000);
        let timer = ManualTimer::new(clock.clone());
        let log = Arc::new(Mutex::new(Vec::new()));

        assert_eq!(timer.next_deadline(), None);
        timer.schedule_after(Duration::from_millis(40), recording_callback(&log, &clock, "a"));
        assert_eq!(timer.next_deadline(), Some(1_040));

        assert_eq!(timer.run_until_idle(10), 1);
        assert_eq!(clock.now(), 1_040);
        assert_eq!(timer.scheduled(), 0);
    }

    #[test]
    fn test_advance_to_past_does_not_rewind() {
        let clock = ManualClock::starting_at(500);
        let timer = ManualTimer::new(clock.clone());
        timer.advance_to(100);
        assert_eq!(clock.now(), 500);
    }
}

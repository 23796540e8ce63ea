// Clock abstraction for scheduling decisions

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Milliseconds since the clock's origin
///
/// Signed so that a clock stepping backward shows up as a negative elapsed time.
pub type Timestamp = i64;

/// Source of the current instant
pub trait Clock: Send + Sync {
    /// Current instant in milliseconds
    fn now(&self) -> Timestamp;
}

/// Convert a duration to whole milliseconds, saturating at `i64::MAX`
pub fn duration_to_millis(duration: Duration) -> Timestamp {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

/// Convert a millisecond delay to a duration; negative values clamp to zero
pub fn millis_to_duration(millis: Timestamp) -> Duration {
    Duration::from_millis(u64::try_from(millis).unwrap_or(0))
}

/// Monotonic clock backed by `tokio::time::Instant`
///
/// Follows tokio's paused test clock, so `tokio::time::advance` moves it.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: tokio::time::Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Timestamp {
        duration_to_millis(self.origin.elapsed())
    }
}

/// Wall clock in Unix milliseconds
///
/// Can step backward when the system time is adjusted.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Manually driven clock shared between tests, the manual timer and the replay tool
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a clock starting at the given instant
    pub fn starting_at(start: Timestamp) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(start)),
        }
    }

    /// Jump to an absolute instant (may move backward)
    pub fn set(&self, now: Timestamp) {
        self.now.store(now, Ordering::SeqCst);
    }

    /// Move forward by the given number of milliseconds
    pub fn advance(&self, millis: i64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_set_and_advance() {
        let clock = ManualClock::starting_at(100);
        assert_eq!(clock.now(), 100);

        clock.advance(50);
        assert_eq!(clock.now(), 150);

        // Moving backward is allowed
        clock.set(20);
        assert_eq!(clock.now(), 20);
    }

    #[test]
    fn test_manual_clock_clones_share_time() {
        let clock = ManualClock::new();
        let other = clock.clone();
        clock.advance(30);
        assert_eq!(other.now(), 30);
    }

    #[test]
    fn test_duration_conversions() {
        assert_eq!(duration_to_millis(Duration::from_millis(250)), 250);
        assert_eq!(duration_to_millis(Duration::MAX), i64::MAX);
        assert_eq!(millis_to_duration(40), Duration::from_millis(40));
        assert_eq!(millis_to_duration(-5), Duration::ZERO);
    }

    #[test]
    fn test_system_clock_is_unix_millis() {
        let now = SystemClock.now();
        // 2020-01-01T00:00:00Z
        assert!(now > 1_577_836_800_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_monotonic_clock_follows_paused_time() {
        let clock = MonotonicClock::new();
        assert_eq!(clock.now(), 0);

        tokio::time::advance(Duration::from_millis(120)).await;
        assert_eq!(clock.now(), 120);
    }
}

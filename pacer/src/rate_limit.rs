// Rate limiter preset over the invocation scheduler

use crate::errors::SchedulerError;
use crate::scheduler::{InvocationScheduler, SchedulerBuilder, SchedulerConfig};
use std::fmt;
use std::time::Duration;

/// Edge options for a rate limiter; both edges default to on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitOptions {
    pub leading: bool,
    pub trailing: bool,
}

impl Default for RateLimitOptions {
    fn default() -> Self {
        Self {
            leading: true,
            trailing: true,
        }
    }
}

impl RateLimitOptions {
    /// Scheduler configuration that invokes at least once per `wait` window
    /// under sustained calls (`max_wait = wait`)
    pub fn config(self, wait: Duration) -> SchedulerConfig {
        SchedulerConfig {
            wait,
            leading: self.leading,
            trailing: self.trailing,
            max_wait: Some(wait),
        }
    }
}

/// Builder for a rate-limited scheduler; clock, timer and name can still be set
pub fn rate_limiter<A, R, E, F>(
    target: F,
    wait: Duration,
    options: RateLimitOptions,
) -> SchedulerBuilder<A, R, E>
where
    A: Send + 'static,
    R: Clone + Send + 'static,
    E: fmt::Display + Send + 'static,
    F: FnMut(A) -> Result<R, E> + Send + 'static,
{
    InvocationScheduler::builder(target).config(options.config(wait))
}

/// Limit `target` to roughly one invocation per `wait`
///
/// Uses the monotonic clock and a delay timer on the current tokio runtime.
pub fn throttle<A, R, E, F>(
    target: F,
    wait: Duration,
    options: RateLimitOptions,
) -> Result<InvocationScheduler<A, R, E>, SchedulerError>
where
    A: Send + 'static,
    R: Clone + Send + 'static,
    E: fmt::Display + Send + 'static,
    F: FnMut(A) -> Result<R, E> + Send + 'static,
{
    rate_limiter(target, wait, options).build()
}

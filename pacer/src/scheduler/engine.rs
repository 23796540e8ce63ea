// Invocation scheduler engine: leading/trailing/maxWait state machine

use super::options::{DebounceOptions, Edge, SchedulerConfig};
use crate::clock::{duration_to_millis, Clock, MonotonicClock, Timestamp};
use crate::errors::SchedulerError;
use crate::telemetry;
use crate::timer::{lock, DelayTimer, Timer, TimerHandle};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, trace};

/// Callable wrapped by a scheduler
pub type Target<A, R, E> = Box<dyn FnMut(A) -> Result<R, E> + Send + 'static>;

const DEFAULT_NAME: &str = "debounced";

/// The single live timer, tagged so stale firings can be told apart
#[derive(Debug, Clone, Copy)]
struct ActiveTimer {
    handle: TimerHandle,
    token: u64,
}

/// Mutable state of a scheduler
#[derive(Debug)]
struct SchedulerState<A, R> {
    last_call_time: Option<Timestamp>,
    last_invoke_time: Timestamp,
    pending_args: Option<A>,
    timer: Option<ActiveTimer>,
    last_result: Option<R>,
    next_token: u64,
    /// Sequence handed to the next invocation that takes pending arguments
    next_invocation: u64,
    /// Sequence of the newest invocation that reached the target
    last_run: Option<u64>,
}

impl<A, R> SchedulerState<A, R> {
    fn new() -> Self {
        Self {
            last_call_time: None,
            last_invoke_time: 0,
            pending_args: None,
            timer: None,
            last_result: None,
            next_token: 0,
            next_invocation: 0,
            last_run: None,
        }
    }
}

struct Inner<A, R, E> {
    name: String,
    config: SchedulerConfig,
    wait_ms: Timestamp,
    max_wait_ms: Option<Timestamp>,
    clock: Arc<dyn Clock>,
    timer: Arc<dyn Timer>,
    target: Mutex<Target<A, R, E>>,
    state: Mutex<SchedulerState<A, R>>,
    error_reporter: Option<UnboundedSender<E>>,
}

impl<A, R, E> Inner<A, R, E>
where
    A: Send + 'static,
    R: Clone + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    fn should_invoke(&self, state: &SchedulerState<A, R>, now: Timestamp) -> bool {
        let Some(last_call) = state.last_call_time else {
            return true;
        };
        let since_call = now.saturating_sub(last_call);
        let since_invoke = now.saturating_sub(state.last_invoke_time);

        // A negative gap means the clock stepped backward; invoke rather than starve.
        since_call >= self.wait_ms
            || since_call < 0
            || self.max_wait_ms.is_some_and(|max_wait| since_invoke >= max_wait)
    }

    fn remaining_wait(&self, state: &SchedulerState<A, R>, now: Timestamp) -> Timestamp {
        let Some(last_call) = state.last_call_time else {
            return 0;
        };
        let waiting = self.wait_ms - now.saturating_sub(last_call);
        let remaining = match self.max_wait_ms {
            Some(max_wait) => {
                waiting.min(max_wait - now.saturating_sub(state.last_invoke_time))
            }
            None => waiting,
        };
        remaining.max(0)
    }

    /// Replace the live timer (if any) with a new one firing after `delay_ms`
    fn start_timer(self: &Arc<Self>, state: &mut SchedulerState<A, R>, delay_ms: Timestamp) {
        if let Some(active) = state.timer.take() {
            self.timer.cancel(active.handle);
        }

        let token = state.next_token;
        state.next_token = state.next_token.wrapping_add(1);

        let weak: Weak<Self> = Arc::downgrade(self);
        let handle = self.timer.schedule_after(
            crate::clock::millis_to_duration(delay_ms),
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.timer_expired(token);
                }
            }),
        );

        trace!(scheduler = %self.name, delay_ms, token, "Timer started");
        state.timer = Some(ActiveTimer { handle, token });
    }

    fn call(self: &Arc<Self>, args: A) -> Result<Option<R>, E> {
        let mut state = lock(&self.state);
        let now = self.clock.now();
        let is_invoking = self.should_invoke(&state, now);

        telemetry::record_call(&self.name);
        state.pending_args = Some(args);
        state.last_call_time = Some(now);

        if is_invoking {
            if state.timer.is_none() {
                return self.leading_edge(state, now);
            }
            if self.max_wait_ms.is_some() {
                // Sustained burst past max_wait: invoke now even without `leading`.
                self.start_timer(&mut state, self.wait_ms);
                return self.invoke_pending(state, now, Edge::MaxWait);
            }
        }

        if state.timer.is_none() {
            self.start_timer(&mut state, self.wait_ms);
        }
        Ok(state.last_result.clone())
    }

    fn leading_edge(
        self: &Arc<Self>,
        mut state: MutexGuard<'_, SchedulerState<A, R>>,
        now: Timestamp,
    ) -> Result<Option<R>, E> {
        state.last_invoke_time = now;
        self.start_timer(&mut state, self.wait_ms);

        if self.config.leading {
            return self.invoke_pending(state, now, Edge::Leading);
        }
        Ok(state.last_result.clone())
    }

    fn trailing_edge(
        &self,
        mut state: MutexGuard<'_, SchedulerState<A, R>>,
        now: Timestamp,
        edge: Edge,
    ) -> Result<Option<R>, E> {
        state.timer = None;

        if self.config.trailing && state.pending_args.is_some() {
            return self.invoke_pending(state, now, edge);
        }
        state.pending_args = None;
        Ok(state.last_result.clone())
    }

    /// Consume the captured arguments and run the target outside the state lock
    ///
    /// Arguments are sequenced when taken. An invocation that reaches the
    /// target after a newer one has already run is dropped, so the target
    /// never sees arguments out of call order and `last_result` always comes
    /// from the newest invocation.
    fn invoke_pending(
        &self,
        mut state: MutexGuard<'_, SchedulerState<A, R>>,
        now: Timestamp,
        edge: Edge,
    ) -> Result<Option<R>, E> {
        let Some(args) = state.pending_args.take() else {
            return Ok(state.last_result.clone());
        };
        state.last_invoke_time = now;
        let sequence = state.next_invocation;
        state.next_invocation += 1;
        drop(state);

        // Lock order: target, then state.
        let mut target = lock(&self.target);
        {
            let mut state = lock(&self.state);
            if state.last_run.is_some_and(|newest| newest > sequence) {
                trace!(scheduler = %self.name, edge = %edge, sequence, "Dropping superseded invocation");
                return Ok(state.last_result.clone());
            }
            state.last_run = Some(sequence);
        }

        debug!(scheduler = %self.name, edge = %edge, at = now, "Invoking target");
        telemetry::record_invocation(&self.name, edge);

        let result = (*target)(args)?;
        lock(&self.state).last_result = Some(result.clone());
        drop(target);
        Ok(Some(result))
    }

    fn timer_expired(self: &Arc<Self>, token: u64) {
        let mut state = lock(&self.state);
        match state.timer {
            Some(active) if active.token == token => {}
            _ => {
                trace!(scheduler = %self.name, token, "Ignoring stale timer firing");
                return;
            }
        }

        let now = self.clock.now();
        if self.should_invoke(&state, now) {
            if let Err(e) = self.trailing_edge(state, now, Edge::Trailing) {
                self.report_failure(e);
            }
            return;
        }

        // A later call pushed the deadline out; re-arm for what is left.
        state.timer = None;
        let remaining = self.remaining_wait(&state, now);
        self.start_timer(&mut state, remaining);
    }

    fn report_failure(&self, e: E) {
        telemetry::record_trailing_failure(&self.name);

        let Some(reporter) = &self.error_reporter else {
            error!(scheduler = %self.name, error = %e, "Trailing invocation failed");
            return;
        };
        if let Err(unsent) = reporter.send(e) {
            error!(
                scheduler = %self.name,
                error = %unsent.0,
                "Trailing invocation failed and the error reporter is closed"
            );
        }
    }

    fn flush(&self) -> Result<Option<R>, E> {
        let mut state = lock(&self.state);
        let Some(active) = state.timer.take() else {
            return Ok(state.last_result.clone());
        };
        self.timer.cancel(active.handle);

        let now = self.clock.now();
        debug!(scheduler = %self.name, at = now, "Flushing pending invocation");
        self.trailing_edge(state, now, Edge::Flush)
    }

    fn cancel(&self) {
        let mut state = lock(&self.state);
        if let Some(active) = state.timer.take() {
            self.timer.cancel(active.handle);
            debug!(scheduler = %self.name, "Pending invocation cancelled");
        }
        state.last_invoke_time = 0;
        state.pending_args = None;
        state.last_call_time = None;
        telemetry::record_cancellation(&self.name);
    }
}

impl<A, R, E> Drop for Inner<A, R, E> {
    fn drop(&mut self) {
        let state = self
            .state
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(active) = state.timer.take() {
            self.timer.cancel(active.handle);
        }
    }
}

/// Rate controller wrapping a target callable
///
/// Collapses bursts of [`call`](Self::call)s into at most one invocation per
/// window, with optional leading-edge, trailing-edge and `max_wait`
/// behaviour. Handles are cheap to clone and share one state.
///
/// The target never runs concurrently with itself. Calling back into the
/// same scheduler from inside the target is not supported.
pub struct InvocationScheduler<A, R, E> {
    inner: Arc<Inner<A, R, E>>,
}

impl<A, R, E> Clone for InvocationScheduler<A, R, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A, R, E> InvocationScheduler<A, R, E>
where
    A: Send + 'static,
    R: Clone + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    /// Start building a scheduler around `target`
    pub fn builder<F>(target: F) -> SchedulerBuilder<A, R, E>
    where
        F: FnMut(A) -> Result<R, E> + Send + 'static,
    {
        SchedulerBuilder::new(Box::new(target))
    }

    /// Request an invocation with `args`
    ///
    /// Returns the fresh result when this call invokes the target (leading
    /// edge or `max_wait` clamp), otherwise the result of the most recent
    /// invocation, or `None` if the target has never run. Target errors from
    /// an invocation made by this call are returned as `Err`.
    pub fn call(&self, args: A) -> Result<Option<R>, E> {
        self.inner.call(args)
    }

    /// Drop any pending invocation and reset timing state
    ///
    /// The cached result is kept. Safe to call repeatedly.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    /// Run a pending trailing invocation now
    ///
    /// With no live timer this returns the cached result and invokes nothing.
    pub fn flush(&self) -> Result<Option<R>, E> {
        self.inner.flush()
    }

    /// Whether a timer is currently live
    pub fn pending(&self) -> bool {
        lock(&self.inner.state).timer.is_some()
    }

    /// Result of the most recent successful invocation
    pub fn last_result(&self) -> Option<R> {
        lock(&self.inner.state).last_result.clone()
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }
}

impl<A, R, E> fmt::Debug for InvocationScheduler<A, R, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationScheduler")
            .field("name", &self.inner.name)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

/// Builder for [`InvocationScheduler`]
///
/// Clock and timer default to [`MonotonicClock`] and a [`DelayTimer`] on the
/// current tokio runtime.
pub struct SchedulerBuilder<A, R, E> {
    name: String,
    config: SchedulerConfig,
    target: Target<A, R, E>,
    clock: Option<Arc<dyn Clock>>,
    timer: Option<Arc<dyn Timer>>,
    error_reporter: Option<UnboundedSender<E>>,
}

impl<A, R, E> SchedulerBuilder<A, R, E>
where
    A: Send + 'static,
    R: Clone + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    fn new(target: Target<A, R, E>) -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            config: SchedulerConfig::default(),
            target,
            clock: None,
            timer: None,
            error_reporter: None,
        }
    }

    /// Name used in logs and metric labels
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn wait(mut self, wait: Duration) -> Self {
        self.config.wait = wait;
        self
    }

    pub fn leading(mut self, leading: bool) -> Self {
        self.config.leading = leading;
        self
    }

    pub fn trailing(mut self, trailing: bool) -> Self {
        self.config.trailing = trailing;
        self
    }

    pub fn max_wait(mut self, max_wait: Duration) -> Self {
        self.config.max_wait = Some(max_wait);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Inject the deferred-callback capability (delay-paced, frame-paced or manual)
    pub fn timer(mut self, timer: Arc<dyn Timer>) -> Self {
        self.timer = Some(timer);
        self
    }

    /// Channel receiving errors from timer-driven trailing invocations
    pub fn error_reporter(mut self, reporter: UnboundedSender<E>) -> Self {
        self.error_reporter = Some(reporter);
        self
    }

    /// Validate the configuration and build the scheduler
    ///
    /// # Errors
    /// - `InvalidConfiguration` when `max_wait < wait` or a duration does not
    ///   fit in `i64` milliseconds
    /// - `TimerUnavailable` when no timer was injected and there is no tokio runtime
    pub fn build(self) -> Result<InvocationScheduler<A, R, E>, SchedulerError> {
        self.config.validate(&self.name)?;

        let timer = match self.timer {
            Some(timer) => timer,
            None => Arc::new(DelayTimer::new().map_err(|e| SchedulerError::TimerUnavailable {
                name: self.name.clone(),
                reason: e.to_string(),
            })?),
        };
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(MonotonicClock::new()));

        debug!(
            scheduler = %self.name,
            wait_ms = duration_to_millis(self.config.wait),
            leading = self.config.leading,
            trailing = self.config.trailing,
            max_wait_ms = self.config.max_wait.map(duration_to_millis),
            "Invocation scheduler created"
        );

        Ok(InvocationScheduler {
            inner: Arc::new(Inner {
                wait_ms: duration_to_millis(self.config.wait),
                max_wait_ms: self.config.max_wait.map(duration_to_millis),
                name: self.name,
                config: self.config,
                clock,
                timer,
                target: Mutex::new(self.target),
                state: Mutex::new(SchedulerState::new()),
                error_reporter: self.error_reporter,
            }),
        })
    }
}

/// Wrap `target` so bursts of calls collapse into spaced invocations
///
/// Uses the monotonic clock and a delay timer on the current tokio runtime.
pub fn debounce<A, R, E, F>(
    target: F,
    wait: Duration,
    options: DebounceOptions,
) -> Result<InvocationScheduler<A, R, E>, SchedulerError>
where
    A: Send + 'static,
    R: Clone + Send + 'static,
    E: fmt::Display + Send + 'static,
    F: FnMut(A) -> Result<R, E> + Send + 'static,
{
    InvocationScheduler::builder(target)
        .config(options.into_config(wait))
        .build()
}

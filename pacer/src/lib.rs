// Invocation pacing: debounce/throttle scheduling for arbitrary callables

pub mod clock;
pub mod config;
pub mod errors;
pub mod rate_limit;
pub mod scheduler;
pub mod telemetry;
pub mod timer;

pub use clock::{Clock, ManualClock, MonotonicClock, SystemClock, Timestamp};
pub use errors::{SchedulerError, TimerError};
pub use rate_limit::{rate_limiter, throttle, RateLimitOptions};
pub use scheduler::{debounce, DebounceOptions, Edge, InvocationScheduler, SchedulerConfig};
pub use timer::{DelayTimer, FrameTimer, ManualTimer, Timer, TimerHandle};

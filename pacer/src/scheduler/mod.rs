// Scheduler module: collapses bursts of calls into spaced invocations

pub mod engine;
pub mod options;

pub use engine::{debounce, InvocationScheduler, SchedulerBuilder, Target};
pub use options::{DebounceOptions, Edge, SchedulerConfig};

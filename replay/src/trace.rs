// Call trace format and virtual-time replay

use pacer::clock::{Clock, ManualClock, Timestamp};
use pacer::config::SchedulerSettings;
use pacer::timer::ManualTimer;
use pacer::{InvocationScheduler, SchedulerError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Upper bound on timer firings while draining after the last event
const MAX_DRAIN_FIRINGS: usize = 100_000;

/// One recorded operation against a scheduler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TraceEvent {
    Call {
        at_ms: Timestamp,
        #[serde(default)]
        value: Value,
    },
    Cancel {
        at_ms: Timestamp,
    },
    Flush {
        at_ms: Timestamp,
    },
}

impl TraceEvent {
    pub fn at_ms(&self) -> Timestamp {
        match self {
            TraceEvent::Call { at_ms, .. }
            | TraceEvent::Cancel { at_ms }
            | TraceEvent::Flush { at_ms } => *at_ms,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Trace {
    pub events: Vec<TraceEvent>,
}

/// Target invocation observed during replay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    pub at_ms: Timestamp,
    pub value: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub scheduler: String,
    pub settings: SchedulerSettings,
    pub calls: usize,
    pub cancels: usize,
    pub flushes: usize,
    pub invocations: Vec<Invocation>,
    pub finished_at_ms: Timestamp,
}

/// Replay `trace` against a scheduler built from `settings` on virtual time
///
/// Events run in `at_ms` order (ties keep file order). After the last event
/// every pending timer is drained so trailing invocations are reported.
pub fn replay(
    name: &str,
    settings: &SchedulerSettings,
    trace: &Trace,
) -> Result<ReplayReport, SchedulerError> {
    let mut events = trace.events.clone();
    events.sort_by_key(TraceEvent::at_ms);

    let start = events.first().map(TraceEvent::at_ms).unwrap_or(0);
    let clock = ManualClock::starting_at(start);
    let timer = Arc::new(ManualTimer::new(clock.clone()));
    let invocations = Arc::new(Mutex::new(Vec::new()));

    let recorded = Arc::clone(&invocations);
    let target_clock = clock.clone();
    let scheduler = InvocationScheduler::builder(move |value: Value| {
        recorded
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(Invocation {
                at_ms: target_clock.now(),
                value: value.clone(),
            });
        Ok::<_, Infallible>(value)
    })
    .name(name)
    .config(settings.to_scheduler_config())
    .clock(Arc::new(clock.clone()))
    .timer(timer.clone())
    .build()?;

    let (mut calls, mut cancels, mut flushes) = (0, 0, 0);
    for event in events {
        timer.advance_to(event.at_ms());
        debug!(scheduler = name, event = ?event, "Replaying event");

        match event {
            TraceEvent::Call { value, .. } => {
                calls += 1;
                // Infallible target
                let _ = scheduler.call(value);
            }
            TraceEvent::Cancel { .. } => {
                cancels += 1;
                scheduler.cancel();
            }
            TraceEvent::Flush { .. } => {
                flushes += 1;
                let _ = scheduler.flush();
            }
        }
    }

    let drained = timer.run_until_idle(MAX_DRAIN_FIRINGS);
    info!(scheduler = name, calls, drained, "Trace replay finished");

    let invocations = invocations
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .clone();

    Ok(ReplayReport {
        scheduler: name.to_string(),
        settings: settings.clone(),
        calls,
        cancels,
        flushes,
        invocations,
        finished_at_ms: clock.now(),
    })
}

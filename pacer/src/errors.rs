// Error handling framework

use thiserror::Error;

/// Scheduler construction errors
///
/// Failures of the wrapped target are not represented here: they are the
/// caller's own error type and flow back through `call`/`flush` or the
/// trailing-edge error reporter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("Invalid scheduler configuration for '{name}': {reason}")]
    InvalidConfiguration { name: String, reason: String },

    #[error("No timer available for scheduler '{name}': {reason}")]
    TimerUnavailable { name: String, reason: String },
}

impl SchedulerError {
    pub(crate) fn invalid(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Timer subsystem errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimerError {
    #[error("No tokio runtime available: {0}")]
    NoRuntime(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_configuration_message() {
        let err = SchedulerError::invalid("search", "max_wait (50ms) is shorter than wait (100ms)");
        assert_eq!(
            err.to_string(),
            "Invalid scheduler configuration for 'search': max_wait (50ms) is shorter than wait (100ms)"
        );
    }

    #[test]
    fn test_timer_error_message() {
        let err = TimerError::NoRuntime("must be called from the context of a Tokio runtime".into());
        assert!(err.to_string().starts_with("No tokio runtime available"));
    }
}

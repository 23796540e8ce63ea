// Scheduler options and invocation edges

use crate::clock::duration_to_millis;
use crate::errors::SchedulerError;
use std::fmt;
use std::time::Duration;

/// Immutable configuration of one invocation scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SchedulerConfig {
    /// Minimum quiet period before a burst is considered over
    pub wait: Duration,
    /// Invoke on the first call of a burst
    pub leading: bool,
    /// Invoke once the burst has been quiet for `wait`, with the last call's arguments
    pub trailing: bool,
    /// Upper bound on how long invocation may be deferred under continuous calls
    pub max_wait: Option<Duration>,
}

impl SchedulerConfig {
    /// Check the configuration before a scheduler is built
    ///
    /// `max_wait` shorter than `wait` is rejected rather than clamped.
    pub fn validate(&self, name: &str) -> Result<(), SchedulerError> {
        if duration_to_millis(self.wait) == i64::MAX {
            return Err(SchedulerError::invalid(
                name,
                "wait is too large to schedule in milliseconds",
            ));
        }

        if let Some(max_wait) = self.max_wait {
            if duration_to_millis(max_wait) == i64::MAX {
                return Err(SchedulerError::invalid(
                    name,
                    "max_wait is too large to schedule in milliseconds",
                ));
            }
            if max_wait < self.wait {
                return Err(SchedulerError::invalid(
                    name,
                    format!(
                        "max_wait ({}ms) is shorter than wait ({}ms)",
                        max_wait.as_millis(),
                        self.wait.as_millis()
                    ),
                ));
            }
        }

        Ok(())
    }
}

/// Edge options for [`crate::debounce`]; everything defaults to off
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DebounceOptions {
    pub leading: bool,
    pub trailing: bool,
    pub max_wait: Option<Duration>,
}

impl DebounceOptions {
    pub fn into_config(self, wait: Duration) -> SchedulerConfig {
        SchedulerConfig {
            wait,
            leading: self.leading,
            trailing: self.trailing,
            max_wait: self.max_wait,
        }
    }
}

/// What triggered an invocation of the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edge {
    /// First call of a burst with `leading` set
    Leading,
    /// A call arriving after `max_wait` without an invocation
    MaxWait,
    /// Timer expiry after the burst went quiet
    Trailing,
    /// Explicit `flush` while a timer was live
    Flush,
}

impl Edge {
    pub fn as_str(&self) -> &'static str {
        match self {
            Edge::Leading => "leading",
            Edge::MaxWait => "max_wait",
            Edge::Trailing => "trailing",
            Edge::Flush => "flush",
        }
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(SchedulerConfig::default().validate("default").is_ok());
    }

    #[test]
    fn test_max_wait_equal_to_wait_is_valid() {
        let config = SchedulerConfig {
            wait: Duration::from_millis(100),
            max_wait: Some(Duration::from_millis(100)),
            ..Default::default()
        };
        assert!(config.validate("equal").is_ok());
    }

    #[test]
    fn test_max_wait_shorter_than_wait_is_rejected() {
        let config = SchedulerConfig {
            wait: Duration::from_millis(100),
            max_wait: Some(Duration::from_millis(50)),
            ..Default::default()
        };
        let err = config.validate("short").unwrap_err();
        assert_eq!(
            err,
            SchedulerError::InvalidConfiguration {
                name: "short".to_string(),
                reason: "max_wait (50ms) is shorter than wait (100ms)".to_string(),
            }
        );
    }

    #[test]
    fn test_unrepresentable_wait_is_rejected() {
        let config = SchedulerConfig {
            wait: Duration::MAX,
            ..Default::default()
        };
        assert!(config.validate("huge").is_err());
    }

    #[test]
    fn test_debounce_options_into_config() {
        let options = DebounceOptions {
            trailing: true,
            max_wait: Some(Duration::from_millis(300)),
            ..Default::default()
        };
        let config = options.into_config(Duration::from_millis(100));
        assert_eq!(config.wait, Duration::from_millis(100));
        assert!(!config.leading);
        assert!(config.trailing);
        assert_eq!(config.max_wait, Some(Duration::from_millis(300)));
    }

    #[test]
    fn test_edge_labels() {
        assert_eq!(Edge::Leading.to_string(), "leading");
        assert_eq!(Edge::MaxWait.as_str(), "max_wait");
        assert_eq!(Edge::Trailing.as_str(), "trailing");
        assert_eq!(Edge::Flush.as_str(), "flush");
    }
}

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, ConfigResult, ConfigValidator};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Finished tasks kept in memory; oldest are evicted first.
    pub history_capacity: usize,
    /// How long the worker waits on an empty queue before re-checking shutdown.
    pub poll_interval_ms: u64,
    /// Optional per-task deadline. Unset means tasks may run indefinitely.
    pub task_timeout_seconds: Option<u64>,
    /// Capacity of the task event broadcast channel.
    pub event_buffer: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            history_capacity: 100,
            poll_interval_ms: 1000,
            task_timeout_seconds: None,
            event_buffer: 256,
        }
    }
}

impl DispatcherConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn task_timeout(&self) -> Option<Duration> {
        self.task_timeout_seconds.map(Duration::from_secs)
    }
}

impl ConfigValidator for DispatcherConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.history_capacity == 0 {
            return Err(ConfigError::validation(
                "dispatcher.history_capacity must be greater than 0",
            ));
        }

        if self.poll_interval_ms == 0 {
            return Err(ConfigError::validation(
                "dispatcher.poll_interval_ms must be greater than 0",
            ));
        }

        if self.task_timeout_seconds == Some(0) {
            return Err(ConfigError::validation(
                "dispatcher.task_timeout_seconds must be greater than 0 when set",
            ));
        }

        if self.event_buffer == 0 {
            return Err(ConfigError::validation(
                "dispatcher.event_buffer must be greater than 0",
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// When false the trigger loop is not started; jobs can still be registered.
    pub enabled: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatcher_defaults() {
        let config = DispatcherConfig::default();
        assert_eq!(config.history_capacity, 100);
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert!(config.task_timeout().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_dispatcher_validation() {
        let config = DispatcherConfig {
            history_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = DispatcherConfig {
            task_timeout_seconds: Some(0),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = DispatcherConfig {
            task_timeout_seconds: Some(30),
            ..Default::default()
        };
        assert_eq!(config.task_timeout(), Some(Duration::from_secs(30)));
        assert!(config.validate().is_ok());
    }
}

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::task::TaskParams;
use crate::errors::{SchedulerError, SchedulerResult};

/// Timing rule of a scheduled job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobTrigger {
    /// 5-field or 6-field cron expression.
    Cron { expression: String },
    /// Fixed interval in seconds.
    Interval { every_secs: u64 },
    /// Fires once at `run_date`.
    Date { run_date: DateTime<Utc> },
}

impl JobTrigger {
    pub fn cron<S: Into<String>>(expression: S) -> Self {
        JobTrigger::Cron {
            expression: expression.into(),
        }
    }

    /// Builds an interval trigger from additive components.
    ///
    /// At least one component must be given and the total must be nonzero.
    pub fn interval(
        seconds: Option<u64>,
        minutes: Option<u64>,
        hours: Option<u64>,
    ) -> SchedulerResult<Self> {
        if seconds.is_none() && minutes.is_none() && hours.is_none() {
            return Err(SchedulerError::validation_error(
                "at least one of seconds, minutes or hours must be specified",
            ));
        }

        let total = minutes
            .unwrap_or(0)
            .checked_mul(60)
            .zip(hours.unwrap_or(0).checked_mul(3600))
            .and_then(|(m, h)| m.checked_add(h))
            .and_then(|s| s.checked_add(seconds.unwrap_or(0)))
            .ok_or_else(|| SchedulerError::validation_error("interval is too large"))?;

        if total == 0 {
            return Err(SchedulerError::validation_error(
                "interval must be greater than zero",
            ));
        }

        Ok(JobTrigger::Interval { every_secs: total })
    }

    pub fn date(run_date: DateTime<Utc>) -> Self {
        JobTrigger::Date { run_date }
    }
}

impl fmt::Display for JobTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobTrigger::Cron { expression } => write!(f, "cron[{expression}]"),
            JobTrigger::Interval { every_secs } => write!(f, "interval[{every_secs}s]"),
            JobTrigger::Date { run_date } => write!(f, "date[{}]", run_date.to_rfc3339()),
        }
    }
}

/// A schedule definition that produces task submissions over time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub trigger: JobTrigger,
    pub task_type: String,
    #[serde(default)]
    pub params: TaskParams,
}

impl Job {
    pub fn new<I: Into<String>, T: Into<String>>(
        id: I,
        trigger: JobTrigger,
        task_type: T,
        params: TaskParams,
    ) -> Self {
        Self {
            id: id.into(),
            trigger,
            task_type: task_type.into(),
            params,
        }
    }
}

/// Read-only view of a registered job, returned by registration and introspection calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobInfo {
    pub id: String,
    pub task_type: String,
    pub trigger: JobTrigger,
    pub next_fire_time: Option<DateTime<Utc>>,
}

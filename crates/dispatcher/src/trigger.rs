use chrono::{DateTime, Duration, Utc};

use taskdeck_core::{JobTrigger, SchedulerError, SchedulerResult};

use crate::cron_utils::CronScheduler;

/// Parsed, ready-to-evaluate form of a [`JobTrigger`].
#[derive(Debug, Clone)]
pub enum TriggerSchedule {
    Cron(CronScheduler),
    Interval(Duration),
    Date(DateTime<Utc>),
}

impl TriggerSchedule {
    pub fn from_trigger(trigger: &JobTrigger) -> SchedulerResult<Self> {
        match trigger {
            JobTrigger::Cron { expression } => Ok(Self::Cron(CronScheduler::new(expression)?)),
            JobTrigger::Interval { every_secs } => {
                if *every_secs == 0 {
                    return Err(SchedulerError::validation_error(
                        "interval must be greater than zero",
                    ));
                }
                let secs = i64::try_from(*every_secs).map_err(|_| interval_too_large())?;
                Duration::try_seconds(secs)
                    .map(Self::Interval)
                    .ok_or_else(interval_too_large)
            }
            JobTrigger::Date { run_date } => Ok(Self::Date(*run_date)),
        }
    }

    /// Fire time right after registration. Past dates are due immediately.
    ///
    /// Fails when an interval pushes the first firing past the representable
    /// date range.
    pub fn first_fire_time(&self, now: DateTime<Utc>) -> SchedulerResult<Option<DateTime<Utc>>> {
        match self {
            Self::Cron(cron) => Ok(cron.next_execution_time(now)),
            Self::Interval(every) => now
                .checked_add_signed(*every)
                .map(Some)
                .ok_or_else(interval_too_large),
            Self::Date(run_date) => Ok(Some(*run_date)),
        }
    }

    /// Fire time after a firing that was due at `scheduled` and ran at `now`.
    ///
    /// The result is always later than `now`; slots missed while the loop was
    /// late collapse into the firing that just happened. Interval jobs keep
    /// their original cadence. Date jobs have no next firing.
    pub fn next_after(
        &self,
        scheduled: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        match self {
            Self::Cron(cron) => cron.next_execution_time(now),
            Self::Interval(every) => {
                let next = scheduled.checked_add_signed(*every)?;
                if next > now {
                    return Some(next);
                }
                let every_ms = every.num_milliseconds().max(1);
                let behind_ms = (now - scheduled).num_milliseconds();
                let step_ms = (behind_ms / every_ms)
                    .checked_add(1)?
                    .checked_mul(every_ms)?;
                scheduled.checked_add_signed(Duration::try_milliseconds(step_ms)?)
            }
            Self::Date(_) => None,
        }
    }

    pub fn is_one_shot(&self) -> bool {
        matches!(self, Self::Date(_))
    }
}

fn interval_too_large() -> SchedulerError {
    SchedulerError::validation_error("interval is too large")
}

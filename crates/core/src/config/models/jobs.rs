use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, ConfigResult, ConfigValidator};
use crate::models::{Job, JobTrigger, TaskParams};

/// A job registered with the trigger scheduler at startup.
///
/// Exactly one trigger kind must be set: `cron`, any of the `interval_*`
/// components, or `run_date` (RFC 3339 string).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    pub id: String,
    pub task_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_minutes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_hours: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub params: TaskParams,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl JobConfig {
    fn has_interval(&self) -> bool {
        self.interval_seconds.is_some()
            || self.interval_minutes.is_some()
            || self.interval_hours.is_some()
    }

    pub fn trigger(&self) -> ConfigResult<JobTrigger> {
        let kinds = [
            self.cron.is_some(),
            self.has_interval(),
            self.run_date.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count();

        if kinds != 1 {
            return Err(ConfigError::validation(format!(
                "job '{}' must define exactly one of cron, interval_* or run_date",
                self.id
            )));
        }

        if let Some(expression) = &self.cron {
            return Ok(JobTrigger::cron(expression.clone()));
        }
        if let Some(run_date) = self.run_date {
            return Ok(JobTrigger::date(run_date));
        }

        JobTrigger::interval(
            self.interval_seconds,
            self.interval_minutes,
            self.interval_hours,
        )
        .map_err(|e| ConfigError::validation(format!("job '{}': {e}", self.id)))
    }

    pub fn to_job(&self) -> ConfigResult<Job> {
        Ok(Job::new(
            self.id.clone(),
            self.trigger()?,
            self.task_type.clone(),
            self.params.clone(),
        ))
    }
}

impl ConfigValidator for JobConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.id.trim().is_empty() {
            return Err(ConfigError::validation("job id must not be empty"));
        }

        if self.task_type.trim().is_empty() {
            return Err(ConfigError::validation(format!(
                "job '{}' has an empty task_type",
                self.id
            )));
        }

        self.trigger().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn job(id: &str) -> JobConfig {
        JobConfig {
            id: id.to_string(),
            task_type: "library_sync".to_string(),
            cron: None,
            interval_seconds: None,
            interval_minutes: None,
            interval_hours: None,
            run_date: None,
            params: TaskParams::new(),
            enabled: true,
        }
    }

    #[test]
    fn test_cron_job_config() {
        let mut config = job("nightly");
        config.cron = Some("0 3 * * *".to_string());
        config.params.insert("library_id".to_string(), json!(1));

        let job = config.to_job().unwrap();
        assert_eq!(job.trigger, JobTrigger::cron("0 3 * * *"));
        assert_eq!(job.params.get("library_id"), Some(&json!(1)));
    }

    #[test]
    fn test_interval_job_config() {
        let mut config = job("poll");
        config.interval_minutes = Some(5);
        assert_eq!(
            config.trigger().unwrap(),
            JobTrigger::Interval { every_secs: 300 }
        );

        config.interval_minutes = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_trigger_kind_required_and_exclusive() {
        let config = job("none");
        assert!(config.trigger().is_err());

        let mut config = job("both");
        config.cron = Some("* * * * *".to_string());
        config.interval_seconds = Some(10);
        assert!(config.trigger().is_err());
    }

    #[test]
    fn test_empty_fields_rejected() {
        let mut config = job("");
        config.interval_seconds = Some(10);
        assert!(config.validate().is_err());

        let mut config = job("ok");
        config.interval_seconds = Some(10);
        config.task_type = " ".to_string();
        assert!(config.validate().is_err());
    }
}

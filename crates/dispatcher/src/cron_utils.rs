use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use cron::Schedule;
use tracing::debug;

use taskdeck_core::{SchedulerError, SchedulerResult};

const WEEKDAY_NAMES: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

/// CRON表达式解析和调度工具
///
/// Accepts the classic 5-field form (`minute hour day month weekday`) and the
/// 6-field form with a leading seconds column. Numeric weekdays use crontab
/// numbering (0 or 7 = Sunday) in both forms. Times are evaluated in UTC.
#[derive(Debug, Clone)]
pub struct CronScheduler {
    expression: String,
    schedule: Schedule,
}

impl CronScheduler {
    /// 创建新的CRON调度器
    pub fn new(cron_expr: &str) -> SchedulerResult<Self> {
        let normalized = normalize_expression(cron_expr)?;
        let schedule = Schedule::from_str(&normalized)
            .map_err(|e| SchedulerError::invalid_cron(cron_expr, e.to_string()))?;

        debug!(expr = %cron_expr, normalized = %normalized, "Parsed cron expression");
        Ok(Self {
            expression: cron_expr.trim().to_string(),
            schedule,
        })
    }

    /// 验证CRON表达式是否有效
    pub fn validate_cron_expression(cron_expr: &str) -> SchedulerResult<()> {
        Self::new(cron_expr).map(|_| ())
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// 获取下一次执行时间 (strictly after `from`)
    pub fn next_execution_time(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&from).next()
    }

    /// 获取从指定时间开始的多个执行时间
    pub fn upcoming_times(&self, from: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
        self.schedule.after(&from).take(count).collect()
    }

    /// 计算下次执行时间距离现在的时长
    pub fn time_until_next_execution(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.next_execution_time(now).map(|next| next - now)
    }
}

/// Brings a 5- or 6-field expression into the seconds-first form the `cron`
/// crate parses, with weekday numbers rewritten as names.
fn normalize_expression(cron_expr: &str) -> SchedulerResult<String> {
    let fields: Vec<&str> = cron_expr.split_whitespace().collect();
    let mut fields: Vec<String> = match fields.len() {
        5 => std::iter::once("0")
            .chain(fields)
            .map(str::to_string)
            .collect(),
        6 => fields.into_iter().map(str::to_string).collect(),
        n => {
            return Err(SchedulerError::validation_error(format!(
                "cron expression must have 5 or 6 fields, got {n}: '{}'",
                cron_expr.trim()
            )))
        }
    };

    fields[5] = normalize_weekday(&fields[5])
        .map_err(|message| SchedulerError::invalid_cron(cron_expr.trim(), message))?;
    Ok(fields.join(" "))
}

/// Rewrites numeric weekday items (`N`, `a-b`, `*/n`, `a-b/n`) as name lists.
/// Items that already use names pass through untouched.
fn normalize_weekday(field: &str) -> Result<String, String> {
    if field == "*" || field == "?" {
        return Ok(field.to_string());
    }

    let mut days = BTreeSet::new();
    let mut named = Vec::new();

    for item in field.split(',') {
        let (base, step) = match item.split_once('/') {
            Some((base, step)) => {
                let step: u8 = step
                    .parse()
                    .map_err(|_| format!("invalid weekday step in '{item}'"))?;
                if step == 0 {
                    return Err(format!("weekday step must be positive in '{item}'"));
                }
                (base, Some(step))
            }
            None => (item, None),
        };

        let range = if base == "*" {
            Some((0u8, 6u8))
        } else if let Some((start, end)) = base.split_once('-') {
            match (start.parse::<u8>(), end.parse::<u8>()) {
                (Ok(start), Ok(end)) => Some((start, end)),
                _ => None,
            }
        } else {
            base.parse::<u8>()
                .ok()
                .map(|n| if step.is_some() { (n, 6) } else { (n, n) })
        };

        let Some((start, end)) = range else {
            named.push(item.to_string());
            continue;
        };

        if start > 7 || end > 7 {
            return Err(format!("weekday out of range (0-7) in '{item}'"));
        }
        if start > end {
            return Err(format!("weekday range is reversed in '{item}'"));
        }

        for day in (start..=end).step_by(usize::from(step.unwrap_or(1))) {
            days.insert(day % 7);
        }
    }

    let mut items: Vec<String> = days
        .into_iter()
        .map(|day| WEEKDAY_NAMES[usize::from(day)].to_string())
        .collect();
    items.extend(named);
    Ok(items.join(","))
}

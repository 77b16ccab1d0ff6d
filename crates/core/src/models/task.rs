use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{SchedulerError, SchedulerResult};

/// Typed parameter bag handed to task handlers.
pub type TaskParams = HashMap<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Success,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Success => "success",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Success | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of submitted work.
///
/// State transitions go through [`Task::start`], [`Task::succeed`],
/// [`Task::fail`] and [`Task::cancel`]; a task never leaves a terminal state
/// and its timestamps are written exactly once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: String,
    pub task_type: String,
    pub params: TaskParams,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl Task {
    pub fn new<I: Into<String>, T: Into<String>>(id: I, task_type: T, params: TaskParams) -> Self {
        Self {
            id: id.into(),
            task_type: task_type.into(),
            params,
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            result: None,
            error: None,
        }
    }

    /// pending → running
    pub fn start(&mut self) -> SchedulerResult<()> {
        self.ensure_transition(TaskStatus::Running, &[TaskStatus::Pending])?;
        self.status = TaskStatus::Running;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// running → success
    pub fn succeed(&mut self, result: serde_json::Value) -> SchedulerResult<()> {
        self.ensure_transition(TaskStatus::Success, &[TaskStatus::Running])?;
        self.result = Some(result);
        self.finish(TaskStatus::Success);
        Ok(())
    }

    pub fn fail<S: Into<String>>(&mut self, error: S) -> SchedulerResult<()> {
        self.ensure_transition(
            TaskStatus::Failed,
            &[TaskStatus::Pending, TaskStatus::Running],
        )?;
        self.error = Some(error.into());
        self.finish(TaskStatus::Failed);
        Ok(())
    }

    pub fn cancel<S: Into<String>>(&mut self, reason: S) -> SchedulerResult<()> {
        self.ensure_transition(
            TaskStatus::Cancelled,
            &[TaskStatus::Pending, TaskStatus::Running],
        )?;
        self.error = Some(reason.into());
        self.finish(TaskStatus::Cancelled);
        Ok(())
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    /// Wall-clock execution time, available once the task has both started and finished.
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }

    fn finish(&mut self, status: TaskStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
    }

    fn ensure_transition(&self, to: TaskStatus, allowed_from: &[TaskStatus]) -> SchedulerResult<()> {
        if allowed_from.contains(&self.status) {
            Ok(())
        } else {
            Err(SchedulerError::InvalidTransition {
                from: self.status,
                to,
            })
        }
    }
}

use thiserror::Error;

use crate::models::TaskStatus;

/// 调度器错误类型定义
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid cron expression: {expr} - {message}")]
    InvalidCron { expr: String, message: String },

    #[error("no handler registered for task type: {task_type}")]
    HandlerMissing { task_type: String },

    #[error("handler execution failed: {0}")]
    HandlerExecution(String),

    #[error("task cancelled: {0}")]
    Cancelled(String),

    #[error("task timed out after {0}s")]
    Timeout(u64),

    #[error("invalid task transition: {from} -> {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },

    #[error("execution context busy: {0}")]
    ContextBusy(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// 统一的Result类型
pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;

impl SchedulerError {
    pub fn validation_error<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_cron<E: Into<String>, M: Into<String>>(expr: E, message: M) -> Self {
        Self::InvalidCron {
            expr: expr.into(),
            message: message.into(),
        }
    }

    pub fn handler_missing<S: Into<String>>(task_type: S) -> Self {
        Self::HandlerMissing {
            task_type: task_type.into(),
        }
    }

    /// Registration-time errors that are returned synchronously to the caller.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            SchedulerError::Validation(_) | SchedulerError::InvalidCron { .. }
        )
    }

    /// Execution-time errors that are recorded on a task instead of being raised.
    pub fn is_execution(&self) -> bool {
        matches!(
            self,
            SchedulerError::HandlerMissing { .. }
                | SchedulerError::HandlerExecution(_)
                | SchedulerError::Cancelled(_)
                | SchedulerError::Timeout(_)
        )
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        SchedulerError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for SchedulerError {
    fn from(err: anyhow::Error) -> Self {
        SchedulerError::Internal(format!("{err:#}"))
    }
}

//! 任务处理器接口定义
//!
//! Business modules (STRM generation, library sync, scraping, ...) implement
//! [`TaskHandler`] and register it under a task type. The dispatcher resolves
//! the handler when a task of that type reaches the head of the queue.
//!
//! ## 处理器约定
//!
//! - A handler receives a [`TaskContext`] carrying the task id, type and the
//!   typed parameter bag, and returns a JSON result or an error.
//! - Errors are recorded on the task, never raised to the submitter.
//! - Cancellation is cooperative: long-running handlers should watch
//!   [`TaskContext::cancelled`] or poll [`TaskContext::is_cancelled`].
//! - Synchronous, slow work must not run on the async executor; wrap it in
//!   [`BlockingHandler`] so it runs on the blocking pool.
//!
//! ## 使用示例
//!
//! ```ignore
//! use async_trait::async_trait;
//! use taskdeck_core::traits::{HandlerResult, TaskContext, TaskHandler};
//!
//! struct ScrapeHandler;
//!
//! #[async_trait]
//! impl TaskHandler for ScrapeHandler {
//!     async fn handle(&self, ctx: TaskContext) -> HandlerResult {
//!         let media_id: i64 = ctx.require("media_id")?;
//!         ctx.report_progress(50, Some("metadata fetched"));
//!         Ok(serde_json::json!({ "media_id": media_id }))
//!     }
//! }
//! ```

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::errors::{SchedulerError, SchedulerResult};
use crate::models::{TaskEvent, TaskParams};

/// Result returned by every handler.
pub type HandlerResult = anyhow::Result<serde_json::Value>;

/// 任务执行上下文
///
/// Everything a handler may look at while it runs. Cloning is cheap; the
/// cancellation token and event channel are shared with the dispatcher.
#[derive(Debug, Clone)]
pub struct TaskContext {
    task_id: String,
    task_type: String,
    params: TaskParams,
    cancel: CancellationToken,
    events: Option<broadcast::Sender<TaskEvent>>,
}

impl TaskContext {
    pub fn new<I: Into<String>, T: Into<String>>(
        task_id: I,
        task_type: T,
        params: TaskParams,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            task_type: task_type.into(),
            params,
            cancel,
            events: None,
        }
    }

    pub fn with_events(mut self, events: broadcast::Sender<TaskEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn task_type(&self) -> &str {
        &self.task_type
    }

    pub fn params(&self) -> &TaskParams {
        &self.params
    }

    /// Typed extraction of an optional parameter.
    pub fn param<T: DeserializeOwned>(&self, key: &str) -> SchedulerResult<Option<T>> {
        match self.params.get(key) {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone()).map(Some).map_err(|e| {
                SchedulerError::validation_error(format!("invalid parameter '{key}': {e}"))
            }),
        }
    }

    /// Typed extraction of a mandatory parameter.
    pub fn require<T: DeserializeOwned>(&self, key: &str) -> SchedulerResult<T> {
        self.param(key)?.ok_or_else(|| {
            SchedulerError::validation_error(format!("missing required parameter '{key}'"))
        })
    }

    pub fn param_or<T: DeserializeOwned>(&self, key: &str, default: T) -> SchedulerResult<T> {
        Ok(self.param(key)?.unwrap_or(default))
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once cancellation has been requested for this task.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Publishes a progress update for subscribers. Percent is clamped to 100.
    pub fn report_progress(&self, percent: u8, message: Option<&str>) {
        if let Some(events) = &self.events {
            // no subscribers is fine
            let _ = events.send(TaskEvent::Progress {
                task_id: self.task_id.clone(),
                percent: percent.min(100),
                message: message.map(str::to_string),
            });
        }
    }
}

/// 任务处理器核心接口
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, ctx: TaskContext) -> HandlerResult;
}

/// Adapts an async closure into a [`TaskHandler`].
pub struct FnHandler<F> {
    func: F,
}

impl<F, Fut> FnHandler<F>
where
    F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F, Fut> TaskHandler for FnHandler<F>
where
    F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn handle(&self, ctx: TaskContext) -> HandlerResult {
        (self.func)(ctx).await
    }
}

/// Runs a synchronous closure on tokio's blocking pool.
///
/// The closure is not interrupted by cancellation; it has to poll
/// [`TaskContext::is_cancelled`] itself and return early.
pub struct BlockingHandler<F> {
    func: Arc<F>,
}

impl<F> BlockingHandler<F>
where
    F: Fn(TaskContext) -> HandlerResult + Send + Sync + 'static,
{
    pub fn new(func: F) -> Self {
        Self {
            func: Arc::new(func),
        }
    }
}

#[async_trait]
impl<F> TaskHandler for BlockingHandler<F>
where
    F: Fn(TaskContext) -> HandlerResult + Send + Sync + 'static,
{
    async fn handle(&self, ctx: TaskContext) -> HandlerResult {
        let func = Arc::clone(&self.func);
        tokio::task::spawn_blocking(move || func(ctx))
            .await
            .map_err(|e| anyhow::anyhow!("blocking handler did not complete: {e}"))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context(params: TaskParams) -> TaskContext {
        TaskContext::new("t1", "scrape", params, CancellationToken::new())
    }

    #[test]
    fn test_typed_param_extraction() {
        let mut params = TaskParams::new();
        params.insert("media_id".to_string(), json!(42));
        params.insert("force".to_string(), json!(true));
        params.insert("path".to_string(), json!("/mnt/media"));
        let ctx = context(params);

        assert_eq!(ctx.require::<i64>("media_id").unwrap(), 42);
        assert_eq!(ctx.param::<bool>("force").unwrap(), Some(true));
        assert_eq!(ctx.require::<String>("path").unwrap(), "/mnt/media");
        assert_eq!(ctx.param::<String>("missing").unwrap(), None);
        assert_eq!(ctx.param_or("retries", 3u32).unwrap(), 3);
    }

    #[test]
    fn test_param_type_mismatch() {
        let mut params = TaskParams::new();
        params.insert("media_id".to_string(), json!("not-a-number"));
        let ctx = context(params);

        let err = ctx.require::<i64>("media_id").unwrap_err();
        assert!(err.is_validation());
        assert!(ctx.require::<i64>("other").unwrap_err().is_validation());
    }

    #[tokio::test]
    async fn test_progress_events() {
        let (tx, mut rx) = broadcast::channel(8);
        let ctx = context(TaskParams::new()).with_events(tx);

        ctx.report_progress(150, Some("almost"));
        let event = rx.recv().await.unwrap();
        assert_eq!(
            event,
            TaskEvent::Progress {
                task_id: "t1".to_string(),
                percent: 100,
                message: Some("almost".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn test_fn_handler() {
        let handler = FnHandler::new(|ctx: TaskContext| async move {
            Ok::<_, anyhow::Error>(json!({ "type": ctx.task_type() }))
        });
        let result = handler.handle(context(TaskParams::new())).await.unwrap();
        assert_eq!(result, json!({"type": "scrape"}));
    }

    #[tokio::test]
    async fn test_blocking_handler() {
        let handler = BlockingHandler::new(|ctx: TaskContext| -> HandlerResult {
            let n: u64 = ctx.require("n")?;
            Ok(json!((1..=n).sum::<u64>()))
        });
        let mut params = TaskParams::new();
        params.insert("n".to_string(), json!(10));
        let result = handler.handle(context(params)).await.unwrap();
        assert_eq!(result, json!(55));
    }

    #[tokio::test]
    async fn test_cancellation_visible_to_handler() {
        let token = CancellationToken::new();
        let ctx = TaskContext::new("t2", "sleep", TaskParams::new(), token.clone());
        assert!(!ctx.is_cancelled());
        token.cancel();
        assert!(ctx.is_cancelled());
        ctx.cancelled().await;
    }
}

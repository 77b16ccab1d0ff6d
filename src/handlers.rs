//! 内置诊断处理器
//!
//! `echo` and `sleep` handlers registered by the binary so a fresh install
//! can exercise the engine end to end before any business handler exists.

use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use taskdeck_core::{HandlerResult, TaskContext, TaskHandler};

pub const ECHO_TASK: &str = "echo";
pub const SLEEP_TASK: &str = "sleep";

/// Returns its parameters unchanged.
pub struct EchoHandler;

#[async_trait]
impl TaskHandler for EchoHandler {
    async fn handle(&self, ctx: TaskContext) -> HandlerResult {
        Ok(serde_json::to_value(ctx.params())?)
    }
}

/// Sleeps for `seconds` (default 1), reporting progress once per second.
/// Stops early when the task is cancelled.
pub struct SleepHandler;

#[async_trait]
impl TaskHandler for SleepHandler {
    async fn handle(&self, ctx: TaskContext) -> HandlerResult {
        let seconds: u64 = ctx.param_or("seconds", 1)?;

        for elapsed in 0..seconds {
            tokio::select! {
                _ = ctx.cancelled() => {
                    return Err(anyhow!("sleep interrupted after {elapsed}s"));
                }
                _ = tokio::time::sleep(Duration::from_secs(1)) => {}
            }
            let percent = ((elapsed + 1) * 100 / seconds).min(100) as u8;
            debug!(task_id = %ctx.task_id(), percent, "sleep progress");
            ctx.report_progress(percent, None);
        }

        Ok(json!({ "slept_seconds": seconds }))
    }
}

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use taskdeck_core::{AppConfig, JobInfo};
use taskdeck_dispatcher::TaskEngine;

use crate::handlers::{EchoHandler, SleepHandler, ECHO_TASK, SLEEP_TASK};
use crate::shutdown::ShutdownSignal;

/// 主应用程序
///
/// Builds the task engine from configuration, registers the built-in
/// handlers and the configured jobs, and runs until shutdown is signalled.
pub struct Application {
    config: AppConfig,
    engine: Arc<TaskEngine>,
}

impl Application {
    /// 创建新的应用实例
    pub async fn new(config: AppConfig) -> Result<Self> {
        let engine = Arc::new(TaskEngine::new(&config).context("创建任务引擎失败")?);

        engine
            .register_handler(ECHO_TASK, Arc::new(EchoHandler))
            .await;
        engine
            .register_handler(SLEEP_TASK, Arc::new(SleepHandler))
            .await;

        let registered = engine
            .register_configured_jobs(&config.jobs)
            .await
            .context("注册配置的定时任务失败")?;
        info!(jobs = registered, "应用程序初始化完成");

        Ok(Self { config, engine })
    }

    pub fn engine(&self) -> Arc<TaskEngine> {
        Arc::clone(&self.engine)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub async fn jobs(&self) -> Vec<JobInfo> {
        self.engine.list_jobs().await
    }

    /// Starts the engine, waits for `shutdown`, then stops it.
    pub async fn run(&self, shutdown: ShutdownSignal) -> Result<()> {
        if !self.engine.start().await {
            warn!("任务引擎已经在运行");
        }

        shutdown.wait().await;
        info!("开始停止任务引擎");

        let stats = self.engine.get_stats().await;
        if stats.queue_length > 0 {
            warn!(queued = stats.queue_length, "停止时仍有未执行的排队任务");
        }
        self.engine.stop().await;
        Ok(())
    }
}

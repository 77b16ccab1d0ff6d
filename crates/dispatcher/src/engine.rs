//! 任务引擎控制面
//!
//! [`TaskEngine`] wires the handler registry, the dispatcher and the trigger
//! scheduler together and exposes the operations callers use: submission,
//! cancellation, job management and introspection.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tracing::{info, warn};

use taskdeck_core::config::{AppConfig, JobConfig};
use taskdeck_core::{
    HandlerRegistry, HandlerResult, Job, JobInfo, SchedulerError, SchedulerResult, Task,
    TaskContext, TaskEvent, TaskHandler, TaskParams,
};

use crate::dispatcher::TaskDispatcher;
use crate::scheduler::JobScheduler;

/// Snapshot returned by [`TaskEngine::get_stats`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineStats {
    pub is_running: bool,
    pub running: usize,
    pub queue_length: usize,
    pub scheduled_jobs: usize,
    pub history_size: usize,
    pub jobs: Vec<JobInfo>,
}

pub struct TaskEngine {
    registry: Arc<HandlerRegistry>,
    dispatcher: TaskDispatcher,
    scheduler: JobScheduler,
    scheduler_enabled: bool,
}

impl TaskEngine {
    /// Builds an engine bound to the current tokio runtime.
    pub fn new(config: &AppConfig) -> SchedulerResult<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| SchedulerError::Internal(format!("no tokio runtime available: {e}")))?;
        Ok(Self::with_runtime(config, runtime))
    }

    pub fn with_runtime(config: &AppConfig, runtime: Handle) -> Self {
        let registry = Arc::new(HandlerRegistry::new());
        let dispatcher = TaskDispatcher::new(Arc::clone(&registry), &config.dispatcher, runtime.clone());
        let scheduler = JobScheduler::new(Arc::new(dispatcher.clone()), runtime);

        Self {
            registry,
            dispatcher,
            scheduler,
            scheduler_enabled: config.scheduler.enabled,
        }
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &TaskDispatcher {
        &self.dispatcher
    }

    pub fn scheduler(&self) -> &JobScheduler {
        &self.scheduler
    }

    // ---- handlers ----

    pub async fn register_handler(&self, task_type: &str, handler: Arc<dyn TaskHandler>) {
        self.registry.register(task_type, handler).await;
    }

    pub async fn register_fn<F, Fut>(&self, task_type: &str, func: F)
    where
        F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.registry.register_fn(task_type, func).await;
    }

    pub async fn register_blocking<F>(&self, task_type: &str, func: F)
    where
        F: Fn(TaskContext) -> HandlerResult + Send + Sync + 'static,
    {
        self.registry.register_blocking(task_type, func).await;
    }

    pub async fn unregister_handler(&self, task_type: &str) -> bool {
        self.registry.unregister(task_type).await
    }

    // ---- lifecycle ----

    /// Starts the worker loop and, unless disabled, the trigger loop.
    pub async fn start(&self) -> bool {
        if !self.dispatcher.start().await {
            warn!("Task engine is already running");
            return false;
        }

        if self.scheduler_enabled {
            self.scheduler.start().await;
        } else {
            info!("Trigger scheduler disabled by configuration");
        }

        let handlers = self.registry.count().await;
        let jobs = self.scheduler.job_count().await;
        info!(handlers, jobs, "Task engine started");
        true
    }

    /// Stops both loops. Running tasks are cancelled and recorded in history;
    /// queued tasks stay queued.
    pub async fn stop(&self) -> bool {
        if !self.dispatcher.is_running().await {
            warn!("Task engine is not running");
            return false;
        }

        self.scheduler.stop().await;
        self.dispatcher.stop().await;
        info!("Task engine stopped");
        true
    }

    pub async fn is_running(&self) -> bool {
        self.dispatcher.is_running().await
    }

    /// Moves the engine to another runtime. Only allowed while stopped.
    /// Returns the number of queued tasks that were discarded.
    pub async fn rebind(&self, runtime: Handle) -> SchedulerResult<usize> {
        if self.is_running().await {
            return Err(SchedulerError::ContextBusy(
                "task engine is running, stop it before rebinding".to_string(),
            ));
        }
        self.scheduler.rebind(runtime.clone()).await?;
        self.dispatcher.rebind(runtime).await
    }

    // ---- tasks ----

    pub async fn submit(&self, task_type: &str, task_id: Option<String>, params: TaskParams) -> String {
        self.dispatcher.submit(task_type, task_id, params).await
    }

    pub async fn stop_task(&self, task_id: &str) -> bool {
        self.dispatcher.stop_task(task_id).await
    }

    pub async fn cancel_pending(&self, task_id: &str) -> bool {
        self.dispatcher.cancel_pending(task_id).await
    }

    pub async fn get_task(&self, task_id: &str) -> Option<Task> {
        self.dispatcher.get_task(task_id).await
    }

    /// The most recent `limit` finished tasks, oldest first.
    pub async fn get_task_history(&self, task_type: Option<&str>, limit: usize) -> Vec<Task> {
        self.dispatcher.history(task_type, limit).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.dispatcher.subscribe()
    }

    // ---- jobs ----

    pub async fn add_cron_job(
        &self,
        job_id: &str,
        cron_expr: &str,
        task_type: &str,
        params: TaskParams,
    ) -> SchedulerResult<JobInfo> {
        self.scheduler
            .add_cron_job(job_id, cron_expr, task_type, params)
            .await
    }

    pub async fn add_interval_job(
        &self,
        job_id: &str,
        seconds: Option<u64>,
        minutes: Option<u64>,
        hours: Option<u64>,
        task_type: &str,
        params: TaskParams,
    ) -> SchedulerResult<JobInfo> {
        self.scheduler
            .add_interval_job(job_id, seconds, minutes, hours, task_type, params)
            .await
    }

    pub async fn add_date_job(
        &self,
        job_id: &str,
        run_date: DateTime<Utc>,
        task_type: &str,
        params: TaskParams,
    ) -> SchedulerResult<JobInfo> {
        self.scheduler
            .add_date_job(job_id, run_date, task_type, params)
            .await
    }

    pub async fn add_job(&self, job: Job) -> SchedulerResult<JobInfo> {
        self.scheduler.add_job(job).await
    }

    pub async fn remove_job(&self, job_id: &str) -> bool {
        self.scheduler.remove_job(job_id).await
    }

    pub async fn get_job(&self, job_id: &str) -> Option<JobInfo> {
        self.scheduler.get_job(job_id).await
    }

    pub async fn list_jobs(&self) -> Vec<JobInfo> {
        self.scheduler.list_jobs().await
    }

    /// Registers every enabled job from configuration. Stops at the first
    /// invalid definition.
    pub async fn register_configured_jobs(&self, jobs: &[JobConfig]) -> SchedulerResult<usize> {
        let mut registered = 0;
        for config in jobs.iter().filter(|job| job.enabled) {
            let job = config
                .to_job()
                .map_err(|e| SchedulerError::Configuration(e.to_string()))?;
            self.scheduler.add_job(job).await?;
            registered += 1;
        }
        Ok(registered)
    }

    pub async fn get_stats(&self) -> EngineStats {
        let dispatch = self.dispatcher.stats().await;
        let jobs = self.scheduler.list_jobs().await;
        EngineStats {
            is_running: self.is_running().await,
            running: dispatch.running,
            queue_length: dispatch.queue_length,
            scheduled_jobs: jobs.len(),
            history_size: dispatch.history_size,
            jobs,
        }
    }
}

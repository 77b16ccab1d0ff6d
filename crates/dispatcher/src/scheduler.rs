//! 定时任务调度器
//!
//! Holds cron, interval and one-shot date jobs and submits a task whenever a
//! job comes due. The trigger loop sleeps until the earliest fire time and is
//! woken early when the job table changes. Firing only submits; handlers run
//! on the dispatcher.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::runtime::Handle;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use taskdeck_core::{
    Job, JobInfo, JobTrigger, SchedulerError, SchedulerResult, TaskParams, TaskSubmitter,
};

use crate::dispatcher::sleep_or_pending;
use crate::metrics::DispatchMetrics;
use crate::trigger::TriggerSchedule;

struct JobEntry {
    job: Job,
    schedule: TriggerSchedule,
    next_fire: Option<DateTime<Utc>>,
    generation: u64,
}

impl JobEntry {
    fn info(&self) -> JobInfo {
        JobInfo {
            id: self.job.id.clone(),
            task_type: self.job.task_type.clone(),
            trigger: self.job.trigger.clone(),
            next_fire_time: self.next_fire,
        }
    }
}

struct DueJob {
    job_id: String,
    generation: u64,
    scheduled: DateTime<Utc>,
    task_type: String,
    params: TaskParams,
}

struct LoopHandle {
    shutdown: CancellationToken,
    join: JoinHandle<()>,
}

struct LoopSlot {
    runtime: Handle,
    handle: Option<LoopHandle>,
}

struct SchedulerInner {
    submitter: Arc<dyn TaskSubmitter>,
    jobs: Mutex<HashMap<String, JobEntry>>,
    changed: Notify,
    generation: AtomicU64,
    trigger_loop: Mutex<LoopSlot>,
    metrics: DispatchMetrics,
}

/// Trigger scheduler feeding a [`TaskSubmitter`].
#[derive(Clone)]
pub struct JobScheduler {
    inner: Arc<SchedulerInner>,
}

impl JobScheduler {
    pub fn new(submitter: Arc<dyn TaskSubmitter>, runtime: Handle) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                submitter,
                jobs: Mutex::new(HashMap::new()),
                changed: Notify::new(),
                generation: AtomicU64::new(0),
                trigger_loop: Mutex::new(LoopSlot {
                    runtime,
                    handle: None,
                }),
                metrics: DispatchMetrics::new(),
            }),
        }
    }

    /// Registers a cron job, replacing any job with the same id.
    pub async fn add_cron_job(
        &self,
        job_id: &str,
        cron_expr: &str,
        task_type: &str,
        params: TaskParams,
    ) -> SchedulerResult<JobInfo> {
        self.add_job(Job::new(job_id, JobTrigger::cron(cron_expr), task_type, params))
            .await
    }

    /// Registers an interval job. Components are additive.
    pub async fn add_interval_job(
        &self,
        job_id: &str,
        seconds: Option<u64>,
        minutes: Option<u64>,
        hours: Option<u64>,
        task_type: &str,
        params: TaskParams,
    ) -> SchedulerResult<JobInfo> {
        let trigger = JobTrigger::interval(seconds, minutes, hours)?;
        self.add_job(Job::new(job_id, trigger, task_type, params))
            .await
    }

    /// Registers a one-shot job. A date in the past fires right away.
    pub async fn add_date_job(
        &self,
        job_id: &str,
        run_date: DateTime<Utc>,
        task_type: &str,
        params: TaskParams,
    ) -> SchedulerResult<JobInfo> {
        self.add_job(Job::new(job_id, JobTrigger::date(run_date), task_type, params))
            .await
    }

    pub async fn add_job(&self, job: Job) -> SchedulerResult<JobInfo> {
        if job.id.trim().is_empty() {
            return Err(SchedulerError::validation_error("job id must not be empty"));
        }

        let schedule = TriggerSchedule::from_trigger(&job.trigger)?;
        let next_fire = schedule.first_fire_time(Utc::now())?;
        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let entry = JobEntry {
            job,
            schedule,
            next_fire,
            generation,
        };
        let info = entry.info();

        let replaced = {
            let mut jobs = self.inner.jobs.lock().await;
            jobs.insert(info.id.clone(), entry).is_some()
        };
        self.inner.changed.notify_one();

        if next_fire.is_none() {
            warn!(job_id = %info.id, trigger = %info.trigger, "Job has no upcoming fire time");
        }
        info!(
            job_id = %info.id,
            task_type = %info.task_type,
            trigger = %info.trigger,
            next_fire_time = ?info.next_fire_time,
            replaced,
            "Job registered"
        );
        Ok(info)
    }

    pub async fn remove_job(&self, job_id: &str) -> bool {
        let removed = self.inner.jobs.lock().await.remove(job_id).is_some();
        if removed {
            self.inner.changed.notify_one();
            info!(job_id = %job_id, "Job removed");
        } else {
            debug!(job_id = %job_id, "remove_job: no such job");
        }
        removed
    }

    pub async fn get_job(&self, job_id: &str) -> Option<JobInfo> {
        self.inner.jobs.lock().await.get(job_id).map(JobEntry::info)
    }

    /// All registered jobs, sorted by id.
    pub async fn list_jobs(&self) -> Vec<JobInfo> {
        let jobs = self.inner.jobs.lock().await;
        let mut infos: Vec<JobInfo> = jobs.values().map(JobEntry::info).collect();
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        infos
    }

    pub async fn job_count(&self) -> usize {
        self.inner.jobs.lock().await.len()
    }

    pub async fn is_running(&self) -> bool {
        self.inner.trigger_loop.lock().await.handle.is_some()
    }

    /// Spawns the trigger loop. Returns false if it is already running.
    pub async fn start(&self) -> bool {
        let mut slot = self.inner.trigger_loop.lock().await;
        if slot.handle.is_some() {
            return false;
        }

        let shutdown = CancellationToken::new();
        let join = slot
            .runtime
            .spawn(run_trigger_loop(Arc::clone(&self.inner), shutdown.clone()));
        slot.handle = Some(LoopHandle { shutdown, join });
        true
    }

    /// Stops the trigger loop. Job definitions are kept.
    pub async fn stop(&self) -> bool {
        let mut slot = self.inner.trigger_loop.lock().await;
        let Some(handle) = slot.handle.take() else {
            return false;
        };

        handle.shutdown.cancel();
        if let Err(err) = handle.join.await {
            error!(error = %err, "Trigger loop terminated abnormally");
        }
        true
    }

    pub async fn rebind(&self, runtime: Handle) -> SchedulerResult<()> {
        let mut slot = self.inner.trigger_loop.lock().await;
        if slot.handle.is_some() {
            return Err(SchedulerError::ContextBusy(
                "trigger scheduler is running, stop it before rebinding".to_string(),
            ));
        }
        slot.runtime = runtime;
        Ok(())
    }
}

async fn run_trigger_loop(inner: Arc<SchedulerInner>, shutdown: CancellationToken) {
    info!("定时任务调度循环已启动");
    loop {
        if shutdown.is_cancelled() {
            break;
        }

        inner.fire_due_jobs(&shutdown).await;

        let wait = inner.time_until_next_fire().await;
        tokio::select! {
            _ = inner.changed.notified() => {}
            _ = sleep_or_pending(wait) => {}
            _ = shutdown.cancelled() => break,
        }
    }
    info!("定时任务调度循环已停止");
}

impl SchedulerInner {
    async fn due_jobs(&self, now: DateTime<Utc>) -> Vec<DueJob> {
        let jobs = self.jobs.lock().await;
        let mut due: Vec<DueJob> = jobs
            .values()
            .filter_map(|entry| {
                let scheduled = entry.next_fire.filter(|next| *next <= now)?;
                Some(DueJob {
                    job_id: entry.job.id.clone(),
                    generation: entry.generation,
                    scheduled,
                    task_type: entry.job.task_type.clone(),
                    params: entry.job.params.clone(),
                })
            })
            .collect();
        due.sort_by_key(|job| job.scheduled);
        due
    }

    async fn fire_due_jobs(&self, shutdown: &CancellationToken) {
        for due in self.due_jobs(Utc::now()).await {
            if shutdown.is_cancelled() {
                return;
            }

            let task_id = self
                .submitter
                .submit(&due.task_type, None, due.params)
                .await;
            self.metrics.record_job_fired(&due.job_id);
            info!(job_id = %due.job_id, task_id = %task_id, scheduled = %due.scheduled, "Job fired");

            let mut jobs = self.jobs.lock().await;
            let Some(entry) = jobs.get_mut(&due.job_id) else {
                continue;
            };
            if entry.generation != due.generation {
                // replaced while firing; the new definition keeps its own schedule
                continue;
            }

            let next = entry.schedule.next_after(due.scheduled, Utc::now());
            if next.is_none() && entry.schedule.is_one_shot() {
                jobs.remove(&due.job_id);
                info!(job_id = %due.job_id, "One-shot job completed and removed");
                continue;
            }
            if next.is_none() {
                warn!(job_id = %due.job_id, "Job has no further fire times");
            }
            entry.next_fire = next;
        }
    }

    async fn time_until_next_fire(&self) -> Option<std::time::Duration> {
        let jobs = self.jobs.lock().await;
        let earliest = jobs.values().filter_map(|entry| entry.next_fire).min()?;
        Some(
            (earliest - Utc::now())
                .to_std()
                .unwrap_or(std::time::Duration::ZERO),
        )
    }
}

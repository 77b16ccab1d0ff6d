//! 任务分发器
//!
//! A deduplicating FIFO queue drained by a single worker loop. Tasks run one
//! at a time, in submission order, each on its own tokio task so that a slow
//! or panicking handler never takes the loop down with it. Finished tasks are
//! moved into a bounded history.

use std::any::Any;
use std::collections::{HashMap, HashSet, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use taskdeck_core::config::DispatcherConfig;
use taskdeck_core::{
    HandlerRegistry, SchedulerError, SchedulerResult, Task, TaskContext, TaskEvent, TaskHandler,
    TaskParams, TaskSubmitter,
};

use crate::history::TaskHistory;
use crate::metrics::DispatchMetrics;

const CANCELLED_BEFORE_START: &str = "cancelled before start";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatcherStats {
    pub running: usize,
    pub queue_length: usize,
    pub history_size: usize,
}

struct RunningTask {
    task: Task,
    cancel: CancellationToken,
    done: CancellationToken,
}

struct DispatchState {
    queue: VecDeque<Task>,
    queued_ids: HashSet<String>,
    running: HashMap<String, RunningTask>,
    history: TaskHistory,
}

struct WorkerHandle {
    shutdown: CancellationToken,
    join: JoinHandle<()>,
}

struct WorkerSlot {
    runtime: Handle,
    worker: Option<WorkerHandle>,
}

struct Dequeued {
    task: Task,
    cancel: CancellationToken,
    done: CancellationToken,
}

struct DispatcherInner {
    registry: Arc<HandlerRegistry>,
    state: Mutex<DispatchState>,
    wakeup: Notify,
    sequence: AtomicU64,
    events: broadcast::Sender<TaskEvent>,
    metrics: DispatchMetrics,
    poll_interval: Duration,
    task_timeout: Option<Duration>,
    worker: Mutex<WorkerSlot>,
}

/// Queue, worker loop and history of the task engine.
#[derive(Clone)]
pub struct TaskDispatcher {
    inner: Arc<DispatcherInner>,
}

impl TaskDispatcher {
    /// Creates a stopped dispatcher whose worker will be spawned on `runtime`.
    pub fn new(registry: Arc<HandlerRegistry>, config: &DispatcherConfig, runtime: Handle) -> Self {
        let (events, _) = broadcast::channel(config.event_buffer.max(1));
        Self {
            inner: Arc::new(DispatcherInner {
                registry,
                state: Mutex::new(DispatchState {
                    queue: VecDeque::new(),
                    queued_ids: HashSet::new(),
                    running: HashMap::new(),
                    history: TaskHistory::new(config.history_capacity),
                }),
                wakeup: Notify::new(),
                sequence: AtomicU64::new(0),
                events,
                metrics: DispatchMetrics::new(),
                poll_interval: config.poll_interval(),
                task_timeout: config.task_timeout(),
                worker: Mutex::new(WorkerSlot {
                    runtime,
                    worker: None,
                }),
            }),
        }
    }

    /// Queues a task and returns its id.
    ///
    /// An id that is already queued or running is returned as-is without
    /// creating a second task.
    pub async fn submit(
        &self,
        task_type: &str,
        task_id: Option<String>,
        params: TaskParams,
    ) -> String {
        let task_id = task_id.unwrap_or_else(|| self.inner.next_task_id(task_type));

        let mut state = self.inner.state.lock().await;
        if state.queued_ids.contains(&task_id) || state.running.contains_key(&task_id) {
            debug!(task_id = %task_id, task_type = %task_type, "Task already in flight, ignoring duplicate submit");
            return task_id;
        }

        state.queued_ids.insert(task_id.clone());
        state
            .queue
            .push_back(Task::new(task_id.clone(), task_type, params));
        let depth = state.queue.len();
        // published under the lock so it always precedes Started
        self.inner.publish(TaskEvent::Queued {
            task_id: task_id.clone(),
            task_type: task_type.to_string(),
        });
        drop(state);

        self.inner.metrics.record_submitted();
        self.inner.metrics.set_queue_depth(depth);
        self.inner.wakeup.notify_one();

        info!(task_id = %task_id, task_type = %task_type, queue_length = depth, "Task queued");
        task_id
    }

    /// Requests cancellation of a running task and waits until it has been
    /// finalized. Returns false when the id is not running.
    pub async fn stop_task(&self, task_id: &str) -> bool {
        let done = {
            let state = self.inner.state.lock().await;
            match state.running.get(task_id) {
                Some(running) => {
                    running.cancel.cancel();
                    running.done.clone()
                }
                None => {
                    debug!(task_id = %task_id, "stop_task: task is not running");
                    return false;
                }
            }
        };

        info!(task_id = %task_id, "Cancellation requested");
        done.cancelled().await;
        true
    }

    /// Removes a task that has not started yet and records it as cancelled.
    pub async fn cancel_pending(&self, task_id: &str) -> bool {
        let mut state = self.inner.state.lock().await;
        let Some(position) = state.queue.iter().position(|task| task.id == task_id) else {
            return false;
        };
        let Some(mut task) = state.queue.remove(position) else {
            return false;
        };
        state.queued_ids.remove(task_id);

        if let Err(err) = task.cancel(CANCELLED_BEFORE_START) {
            error!(task_id = %task_id, error = %err, "Failed to cancel pending task");
        }
        let event = finished_event(&task);
        self.inner.metrics.record_finished(&task);
        self.inner.metrics.set_queue_depth(state.queue.len());
        state.history.push(task);
        drop(state);

        self.inner.publish(event);
        info!(task_id = %task_id, "Pending task cancelled");
        true
    }

    /// Looks a task up in the running set, the queue and then history.
    pub async fn get_task(&self, task_id: &str) -> Option<Task> {
        let state = self.inner.state.lock().await;
        if let Some(running) = state.running.get(task_id) {
            return Some(running.task.clone());
        }
        if let Some(task) = state.queue.iter().find(|task| task.id == task_id) {
            return Some(task.clone());
        }
        state.history.find(task_id).cloned()
    }

    pub async fn history(&self, task_type: Option<&str>, limit: usize) -> Vec<Task> {
        let state = self.inner.state.lock().await;
        state.history.recent(task_type, limit)
    }

    pub async fn stats(&self) -> DispatcherStats {
        let state = self.inner.state.lock().await;
        DispatcherStats {
            running: state.running.len(),
            queue_length: state.queue.len(),
            history_size: state.history.len(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.inner.events.subscribe()
    }

    pub async fn is_running(&self) -> bool {
        self.inner.worker.lock().await.worker.is_some()
    }

    /// Spawns the worker loop. Returns false if it is already running.
    pub async fn start(&self) -> bool {
        let mut slot = self.inner.worker.lock().await;
        if slot.worker.is_some() {
            return false;
        }

        let shutdown = CancellationToken::new();
        let join = slot
            .runtime
            .spawn(run_worker(Arc::clone(&self.inner), shutdown.clone()));
        slot.worker = Some(WorkerHandle { shutdown, join });
        true
    }

    /// Stops the worker loop, cancelling the running task and waiting for it
    /// to land in history. Queued tasks stay queued.
    pub async fn stop(&self) -> bool {
        let mut slot = self.inner.worker.lock().await;
        let Some(worker) = slot.worker.take() else {
            return false;
        };

        worker.shutdown.cancel();
        let cancelled = {
            let state = self.inner.state.lock().await;
            for running in state.running.values() {
                running.cancel.cancel();
            }
            state.running.len()
        };
        if cancelled > 0 {
            info!(cancelled, "Cancelling running tasks for shutdown");
        }

        if let Err(err) = worker.join.await {
            error!(error = %err, "Worker loop terminated abnormally");
        }
        true
    }

    /// Binds the dispatcher to another runtime. Only allowed while stopped;
    /// queued tasks are discarded, history is kept. Returns the number of
    /// discarded tasks.
    pub async fn rebind(&self, runtime: Handle) -> SchedulerResult<usize> {
        let mut slot = self.inner.worker.lock().await;
        if slot.worker.is_some() {
            return Err(SchedulerError::ContextBusy(
                "dispatcher is running, stop it before rebinding".to_string(),
            ));
        }
        slot.runtime = runtime;

        let mut state = self.inner.state.lock().await;
        let discarded = state.queue.len();
        state.queue.clear();
        state.queued_ids.clear();
        state.running.clear();
        self.inner.metrics.set_queue_depth(0);

        if discarded > 0 {
            warn!(discarded, "Dispatcher rebound, queued tasks discarded");
        } else {
            info!("Dispatcher rebound to new runtime");
        }
        Ok(discarded)
    }
}

#[async_trait]
impl TaskSubmitter for TaskDispatcher {
    async fn submit(&self, task_type: &str, task_id: Option<String>, params: TaskParams) -> String {
        TaskDispatcher::submit(self, task_type, task_id, params).await
    }
}

async fn run_worker(inner: Arc<DispatcherInner>, shutdown: CancellationToken) {
    info!("Worker loop started");
    loop {
        if shutdown.is_cancelled() {
            break;
        }

        match inner.next_task(&shutdown).await {
            Some(dequeued) => inner.process(dequeued).await,
            None => {
                tokio::select! {
                    _ = inner.wakeup.notified() => {}
                    _ = tokio::time::sleep(inner.poll_interval) => {}
                    _ = shutdown.cancelled() => break,
                }
            }
        }
    }
    info!("Worker loop stopped");
}

impl DispatcherInner {
    fn next_task_id(&self, task_type: &str) -> String {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!("{task_type}_{}_{sequence}", Utc::now().timestamp_millis())
    }

    fn publish(&self, event: TaskEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    async fn next_task(&self, shutdown: &CancellationToken) -> Option<Dequeued> {
        let mut state = self.state.lock().await;
        if shutdown.is_cancelled() {
            return None;
        }

        while let Some(task) = state.queue.pop_front() {
            state.queued_ids.remove(&task.id);
            if state.running.contains_key(&task.id) {
                warn!(task_id = %task.id, "Discarding duplicate of a running task");
                continue;
            }

            let cancel = shutdown.child_token();
            let done = CancellationToken::new();
            state.running.insert(
                task.id.clone(),
                RunningTask {
                    task: task.clone(),
                    cancel: cancel.clone(),
                    done: done.clone(),
                },
            );
            self.metrics.set_queue_depth(state.queue.len());
            return Some(Dequeued { task, cancel, done });
        }
        None
    }

    async fn process(&self, dequeued: Dequeued) {
        let Dequeued { task, cancel, done } = dequeued;
        let snapshot = task.clone();

        let finished = match AssertUnwindSafe(self.execute(task, cancel)).catch_unwind().await {
            Ok(task) => task,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(task_id = %snapshot.id, panic = %message, "Unexpected fault while executing task");
                let mut task = snapshot;
                if let Err(err) = task.fail(format!("internal error: {message}")) {
                    error!(task_id = %task.id, error = %err, "Could not record fault on task");
                }
                task
            }
        };

        self.finalize(finished, done).await;
    }

    async fn execute(&self, mut task: Task, cancel: CancellationToken) -> Task {
        if let Err(err) = task.start() {
            error!(task_id = %task.id, error = %err, "Task could not be started");
            return task;
        }
        {
            let mut state = self.state.lock().await;
            if let Some(running) = state.running.get_mut(&task.id) {
                running.task = task.clone();
            }
        }
        self.publish(TaskEvent::Started {
            task_id: task.id.clone(),
            task_type: task.task_type.clone(),
        });
        info!(task_id = %task.id, task_type = %task.task_type, "Executing task");

        let outcome = match self.registry.get(&task.task_type).await {
            Some(handler) => {
                let ctx = TaskContext::new(
                    task.id.clone(),
                    task.task_type.clone(),
                    task.params.clone(),
                    cancel.clone(),
                )
                .with_events(self.events.clone());
                self.run_handler(handler, ctx, &cancel).await
            }
            None => Err(SchedulerError::handler_missing(&task.task_type)),
        };

        let applied = match outcome {
            Ok(value) => task.succeed(value),
            Err(err @ SchedulerError::Cancelled(_)) => task.cancel(err.to_string()),
            Err(err) => {
                warn!(task_id = %task.id, task_type = %task.task_type, error = %err, "Task failed");
                task.fail(err.to_string())
            }
        };
        if let Err(err) = applied {
            error!(task_id = %task.id, error = %err, "Could not record task outcome");
        }

        info!(
            task_id = %task.id,
            task_type = %task.task_type,
            status = %task.status,
            duration_ms = task.duration().map(|d| d.num_milliseconds()).unwrap_or_default(),
            "Task finished"
        );
        task
    }

    async fn run_handler(
        &self,
        handler: Arc<dyn TaskHandler>,
        ctx: TaskContext,
        cancel: &CancellationToken,
    ) -> SchedulerResult<serde_json::Value> {
        let mut join = tokio::spawn(async move { handler.handle(ctx).await });

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                join.abort();
                let _ = join.await;
                Err(SchedulerError::Cancelled("stop requested".to_string()))
            }
            _ = sleep_or_pending(self.task_timeout) => {
                join.abort();
                let _ = join.await;
                Err(SchedulerError::Timeout(
                    self.task_timeout.map(|d| d.as_secs()).unwrap_or_default(),
                ))
            }
            joined = &mut join => match joined {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(err)) => Err(SchedulerError::HandlerExecution(format!("{err:#}"))),
                Err(join_err) if join_err.is_panic() => {
                    let payload = join_err.into_panic();
                    Err(SchedulerError::HandlerExecution(format!(
                        "handler panicked: {}",
                        panic_message(payload.as_ref())
                    )))
                }
                Err(_) => Err(SchedulerError::Cancelled("handler aborted".to_string())),
            },
        }
    }

    async fn finalize(&self, task: Task, done: CancellationToken) {
        let event = finished_event(&task);
        {
            let mut state = self.state.lock().await;
            state.running.remove(&task.id);
            self.metrics.record_finished(&task);
            if let Some(evicted) = state.history.push(task) {
                debug!(task_id = %evicted.id, "Evicted oldest history entry");
            }
        }
        self.publish(event);
        done.cancel();
    }
}

/// Sleeps for `duration`, or forever when there is none.
pub(crate) async fn sleep_or_pending(duration: Option<Duration>) {
    match duration {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending().await,
    }
}

fn finished_event(task: &Task) -> TaskEvent {
    TaskEvent::Finished {
        task_id: task.id.clone(),
        task_type: task.task_type.clone(),
        status: task.status,
        error: task.error.clone(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dispatcher(capacity: usize) -> TaskDispatcher {
        let config = DispatcherConfig {
            history_capacity: capacity,
            poll_interval_ms: 50,
            ..Default::default()
        };
        TaskDispatcher::new(
            Arc::new(HandlerRegistry::new()),
            &config,
            Handle::current(),
        )
    }

    #[tokio::test]
    async fn test_generated_ids_are_unique() {
        let dispatcher = dispatcher(10);
        let a = dispatcher.submit("echo", None, TaskParams::new()).await;
        let b = dispatcher.submit("echo", None, TaskParams::new()).await;
        assert_ne!(a, b);
        assert!(a.starts_with("echo_"));
        assert_eq!(dispatcher.stats().await.queue_length, 2);
    }

    #[tokio::test]
    async fn test_duplicate_submit_while_queued() {
        let dispatcher = dispatcher(10);
        let first = dispatcher
            .submit("echo", Some("job-1".to_string()), TaskParams::new())
            .await;
        let mut params = TaskParams::new();
        params.insert("other".to_string(), json!(true));
        let second = dispatcher
            .submit("echo", Some("job-1".to_string()), params)
            .await;

        assert_eq!(first, second);
        assert_eq!(dispatcher.stats().await.queue_length, 1);
        let task = dispatcher.get_task("job-1").await.unwrap();
        assert!(task.params.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_pending_records_history() {
        let dispatcher = dispatcher(10);
        dispatcher
            .submit("echo", Some("p1".to_string()), TaskParams::new())
            .await;

        assert!(dispatcher.cancel_pending("p1").await);
        assert!(!dispatcher.cancel_pending("p1").await);

        let stats = dispatcher.stats().await;
        assert_eq!(stats.queue_length, 0);
        assert_eq!(stats.history_size, 1);

        let task = dispatcher.get_task("p1").await.unwrap();
        assert_eq!(task.status, taskdeck_core::TaskStatus::Cancelled);
        assert_eq!(task.error.as_deref(), Some(CANCELLED_BEFORE_START));

        // id is free again
        dispatcher
            .submit("echo", Some("p1".to_string()), TaskParams::new())
            .await;
        assert_eq!(dispatcher.stats().await.queue_length, 1);
    }

    #[tokio::test]
    async fn test_stop_task_unknown_id() {
        let dispatcher = dispatcher(10);
        assert!(!dispatcher.stop_task("nope").await);
    }

    #[tokio::test]
    async fn test_start_stop_idempotent() {
        let dispatcher = dispatcher(10);
        assert!(dispatcher.start().await);
        assert!(!dispatcher.start().await);
        assert!(dispatcher.is_running().await);
        assert!(dispatcher.stop().await);
        assert!(!dispatcher.stop().await);
        assert!(!dispatcher.is_running().await);
    }

    #[tokio::test]
    async fn test_rebind_requires_stopped_worker() {
        let dispatcher = dispatcher(10);
        dispatcher.submit("echo", None, TaskParams::new()).await;
        dispatcher.start().await;

        let err = dispatcher.rebind(Handle::current()).await.unwrap_err();
        assert!(matches!(err, SchedulerError::ContextBusy(_)));

        dispatcher.stop().await;
        assert!(dispatcher.rebind(Handle::current()).await.is_ok());
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(42);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}

use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};

use taskdeck_core::Task;

/// Dispatcher metrics published through the `metrics` facade.
///
/// Without an installed recorder every handle is a no-op.
#[derive(Clone)]
pub struct DispatchMetrics {
    tasks_submitted_total: Counter,
    task_duration: Histogram,
    queue_depth: Gauge,
}

impl DispatchMetrics {
    pub fn new() -> Self {
        Self {
            tasks_submitted_total: counter!("taskdeck_tasks_submitted_total"),
            task_duration: histogram!("taskdeck_task_duration_seconds"),
            queue_depth: gauge!("taskdeck_queue_depth"),
        }
    }

    pub fn record_submitted(&self) {
        self.tasks_submitted_total.increment(1);
    }

    pub fn set_queue_depth(&self, depth: usize) {
        self.queue_depth.set(depth as f64);
    }

    pub fn record_finished(&self, task: &Task) {
        counter!("taskdeck_tasks_finished_total", "status" => task.status.as_str()).increment(1);
        if let Some(duration) = task.duration() {
            self.task_duration
                .record(duration.num_milliseconds() as f64 / 1000.0);
        }
    }

    /// Labelled per job, so the handle is resolved on each call.
    pub fn record_job_fired(&self, job_id: &str) {
        counter!("taskdeck_job_firings_total", "job_id" => job_id.to_string()).increment(1);
    }
}

impl Default for DispatchMetrics {
    fn default() -> Self {
        Self::new()
    }
}

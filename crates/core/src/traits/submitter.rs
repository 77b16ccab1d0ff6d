use async_trait::async_trait;

use crate::models::TaskParams;

/// Entry point through which work reaches the task queue.
///
/// The trigger scheduler only depends on this seam, so it never executes
/// handler logic itself and can be tested against a recording submitter.
#[async_trait]
pub trait TaskSubmitter: Send + Sync {
    /// Queues a task and returns its id. Submitting an id that is already
    /// queued or running returns that id without queuing a second task.
    async fn submit(&self, task_type: &str, task_id: Option<String>, params: TaskParams)
        -> String;
}

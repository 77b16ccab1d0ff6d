use serde::{Deserialize, Serialize};

use super::task::TaskStatus;

/// Task update broadcast to subscribers as a task moves through the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskEvent {
    Queued {
        task_id: String,
        task_type: String,
    },
    Started {
        task_id: String,
        task_type: String,
    },
    Progress {
        task_id: String,
        percent: u8,
        message: Option<String>,
    },
    Finished {
        task_id: String,
        task_type: String,
        status: TaskStatus,
        error: Option<String>,
    },
}

impl TaskEvent {
    pub fn task_id(&self) -> &str {
        match self {
            TaskEvent::Queued { task_id, .. }
            | TaskEvent::Started { task_id, .. }
            | TaskEvent::Progress { task_id, .. }
            | TaskEvent::Finished { task_id, .. } => task_id,
        }
    }
}

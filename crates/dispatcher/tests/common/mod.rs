#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use taskdeck_core::config::AppConfig;
use taskdeck_core::{TaskParams, TaskSubmitter};
use taskdeck_dispatcher::TaskEngine;

/// Polls `check` until it holds, panicking after five seconds.
pub async fn wait_for<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not met within 5s");
}

pub fn test_config(history_capacity: usize) -> AppConfig {
    let mut config = AppConfig::default();
    config.dispatcher.history_capacity = history_capacity;
    config.dispatcher.poll_interval_ms = 50;
    config
}

pub fn test_engine(history_capacity: usize) -> TaskEngine {
    TaskEngine::new(&test_config(history_capacity)).expect("engine inside runtime")
}

/// Submitter that records every firing instead of queueing work.
#[derive(Default)]
pub struct RecordingSubmitter {
    pub submissions: Mutex<Vec<(String, TaskParams)>>,
}

impl RecordingSubmitter {
    pub async fn count(&self) -> usize {
        self.submissions.lock().await.len()
    }

    pub async fn task_types(&self) -> Vec<String> {
        self.submissions
            .lock()
            .await
            .iter()
            .map(|(task_type, _)| task_type.clone())
            .collect()
    }
}

#[async_trait]
impl TaskSubmitter for RecordingSubmitter {
    async fn submit(&self, task_type: &str, _task_id: Option<String>, params: TaskParams) -> String {
        let mut submissions = self.submissions.lock().await;
        submissions.push((task_type.to_string(), params));
        format!("{task_type}_{}", submissions.len())
    }
}

pub fn recording_submitter() -> Arc<RecordingSubmitter> {
    Arc::new(RecordingSubmitter::default())
}

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::traits::{BlockingHandler, FnHandler, HandlerResult, TaskContext, TaskHandler};

/// Maps task types to their handlers.
///
/// Registration is last-write-wins so handlers can be swapped while the
/// engine is running.
pub struct HandlerRegistry {
    handlers: Arc<RwLock<HashMap<String, Arc<dyn TaskHandler>>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn register<S: Into<String>>(&self, task_type: S, handler: Arc<dyn TaskHandler>) {
        let task_type = task_type.into();
        let mut registry = self.handlers.write().await;
        if registry.insert(task_type.clone(), handler).is_some() {
            debug!(task_type = %task_type, "Replaced existing task handler");
        }
        info!(task_type = %task_type, "Registered task handler");
    }

    /// Registers an async closure.
    pub async fn register_fn<S, F, Fut>(&self, task_type: S, func: F)
    where
        S: Into<String>,
        F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.register(task_type, Arc::new(FnHandler::new(func))).await;
    }

    /// Registers a synchronous closure that runs on the blocking pool.
    pub async fn register_blocking<S, F>(&self, task_type: S, func: F)
    where
        S: Into<String>,
        F: Fn(TaskContext) -> HandlerResult + Send + Sync + 'static,
    {
        self.register(task_type, Arc::new(BlockingHandler::new(func)))
            .await;
    }

    pub async fn get(&self, task_type: &str) -> Option<Arc<dyn TaskHandler>> {
        let registry = self.handlers.read().await;
        registry.get(task_type).cloned()
    }

    pub async fn unregister(&self, task_type: &str) -> bool {
        let mut registry = self.handlers.write().await;
        let removed = registry.remove(task_type).is_some();
        if removed {
            info!(task_type = %task_type, "Unregistered task handler");
        }
        removed
    }

    pub async fn contains(&self, task_type: &str) -> bool {
        let registry = self.handlers.read().await;
        registry.contains_key(task_type)
    }

    /// Registered task types, sorted.
    pub async fn task_types(&self) -> Vec<String> {
        let registry = self.handlers.read().await;
        let mut types: Vec<String> = registry.keys().cloned().collect();
        types.sort();
        types
    }

    pub async fn count(&self) -> usize {
        let registry = self.handlers.read().await;
        registry.len()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TaskParams;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    fn context() -> TaskContext {
        TaskContext::new("t1", "echo", TaskParams::new(), CancellationToken::new())
    }

    #[tokio::test]
    async fn test_register_and_lookup() {
        let registry = HandlerRegistry::new();
        registry
            .register_fn("echo", |_ctx: TaskContext| async move {
                Ok::<_, anyhow::Error>(json!("first"))
            })
            .await;

        assert!(registry.contains("echo").await);
        assert!(!registry.contains("scrape").await);
        assert!(registry.get("scrape").await.is_none());

        let handler = registry.get("echo").await.unwrap();
        assert_eq!(handler.handle(context()).await.unwrap(), json!("first"));
    }

    #[tokio::test]
    async fn test_reregistration_last_write_wins() {
        let registry = HandlerRegistry::new();
        registry
            .register_fn("echo", |_ctx: TaskContext| async move {
                Ok::<_, anyhow::Error>(json!("first"))
            })
            .await;
        registry
            .register_blocking("echo", |_ctx: TaskContext| -> HandlerResult {
                Ok(json!("second"))
            })
            .await;

        assert_eq!(registry.count().await, 1);
        let handler = registry.get("echo").await.unwrap();
        assert_eq!(handler.handle(context()).await.unwrap(), json!("second"));
    }

    #[tokio::test]
    async fn test_unregister_and_list() {
        let registry = HandlerRegistry::new();
        registry
            .register_fn("strm_generation", |_ctx: TaskContext| async move {
                Ok::<_, anyhow::Error>(json!(null))
            })
            .await;
        registry
            .register_fn("library_sync", |_ctx: TaskContext| async move {
                Ok::<_, anyhow::Error>(json!(null))
            })
            .await;

        assert_eq!(
            registry.task_types().await,
            vec!["library_sync".to_string(), "strm_generation".to_string()]
        );
        assert!(registry.unregister("library_sync").await);
        assert!(!registry.unregister("library_sync").await);
        assert_eq!(registry.count().await, 1);
    }
}

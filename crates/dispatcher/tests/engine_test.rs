mod common;

#[cfg(test)]
mod engine_tests {
    use chrono::Utc;
    use serde_json::json;

    use taskdeck_core::config::AppConfig;
    use taskdeck_core::{SchedulerError, TaskContext, TaskParams, TaskStatus};
    use taskdeck_dispatcher::TaskEngine;

    use crate::common::{test_engine, wait_for};

    async fn register_echo(engine: &TaskEngine) {
        engine
            .register_fn("echo", |ctx: TaskContext| async move {
                Ok::<_, anyhow::Error>(json!(ctx.params().clone()))
            })
            .await;
    }

    #[tokio::test]
    async fn test_end_to_end_echo() {
        let engine = test_engine(100);
        register_echo(&engine).await;
        engine.start().await;

        let mut params = TaskParams::new();
        params.insert("message".to_string(), json!("hello"));
        let id = engine.submit("echo", None, params).await;

        let e = &engine;
        let task_id = id.as_str();
        wait_for(|| async move {
            e.get_task(task_id)
                .await
                .map(|t| t.is_finished())
                .unwrap_or(false)
        })
        .await;

        let history = engine.get_task_history(Some("echo"), 10).await;
        assert_eq!(history.len(), 1);
        let task = &history[0];
        assert_eq!(task.status, TaskStatus::Success);
        assert_eq!(task.result, Some(json!({"message": "hello"})));
        assert!(task.created_at <= task.started_at.unwrap());
        assert!(task.started_at.unwrap() <= task.finished_at.unwrap());
        engine.stop().await;
    }

    #[tokio::test]
    async fn test_scheduled_jobs_run_handlers() {
        let engine = test_engine(100);
        register_echo(&engine).await;
        engine
            .add_interval_job("tick", Some(1), None, None, "echo", TaskParams::new())
            .await
            .unwrap();
        engine
            .add_date_job(
                "now",
                Utc::now() - chrono::Duration::seconds(5),
                "echo",
                TaskParams::new(),
            )
            .await
            .unwrap();
        engine.start().await;

        let e = &engine;
        wait_for(|| async move { e.get_stats().await.history_size >= 2 }).await;

        let stats = engine.get_stats().await;
        assert!(stats.is_running);
        assert_eq!(stats.scheduled_jobs, 1);
        assert_eq!(stats.jobs[0].id, "tick");
        assert!(stats.jobs[0].next_fire_time.is_some());
        assert!(engine
            .get_task_history(None, 10)
            .await
            .iter()
            .all(|t| t.status == TaskStatus::Success));
        engine.stop().await;
    }

    #[tokio::test]
    async fn test_start_and_stop_are_idempotent() {
        let engine = test_engine(100);
        assert!(!engine.stop().await);
        assert!(engine.start().await);
        assert!(!engine.start().await);
        assert!(engine.get_stats().await.is_running);
        assert!(engine.stop().await);
        assert!(!engine.stop().await);
        assert!(!engine.get_stats().await.is_running);
    }

    #[tokio::test]
    async fn test_history_query_filters_and_limits() {
        let engine = test_engine(100);
        register_echo(&engine).await;
        engine
            .register_fn("other", |_ctx: TaskContext| async move {
                Ok::<_, anyhow::Error>(json!(null))
            })
            .await;

        for i in 0..3 {
            engine.submit("echo", Some(format!("e{i}")), TaskParams::new()).await;
            engine.submit("other", Some(format!("o{i}")), TaskParams::new()).await;
        }
        engine.start().await;
        let e = &engine;
        wait_for(|| async move { e.get_stats().await.history_size == 6 }).await;

        let ids: Vec<String> = engine
            .get_task_history(Some("echo"), 2)
            .await
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec!["e1", "e2"]);
        assert_eq!(engine.get_task_history(None, 4).await[0].id, "e1");
        engine.stop().await;
    }

    #[tokio::test]
    async fn test_configured_jobs_are_registered() {
        let config = AppConfig::from_toml(
            r#"
[[jobs]]
id = "nightly"
task_type = "library_sync"
cron = "0 3 * * *"

[[jobs]]
id = "poll"
task_type = "echo"
interval_minutes = 5

[[jobs]]
id = "off"
task_type = "echo"
interval_seconds = 10
enabled = false
"#,
        )
        .unwrap();
        let engine = TaskEngine::new(&config).unwrap();

        let registered = engine.register_configured_jobs(&config.jobs).await.unwrap();
        assert_eq!(registered, 2);
        let ids: Vec<String> = engine.list_jobs().await.into_iter().map(|j| j.id).collect();
        assert_eq!(ids, vec!["nightly", "poll"]);
        assert!(engine.get_job("off").await.is_none());
    }

    #[tokio::test]
    async fn test_configured_job_with_bad_cron() {
        let config = AppConfig::from_toml(
            r#"
[[jobs]]
id = "broken"
task_type = "echo"
cron = "* * *"
"#,
        )
        .unwrap();
        let engine = TaskEngine::new(&config).unwrap();

        let err = engine
            .register_configured_jobs(&config.jobs)
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert!(engine.list_jobs().await.is_empty());
    }

    #[tokio::test]
    async fn test_configured_job_with_oversized_interval() {
        let config = AppConfig::from_toml(
            r#"
[[jobs]]
id = "forever"
task_type = "echo"
interval_hours = 10000000000
"#,
        )
        .unwrap();
        let engine = TaskEngine::new(&config).unwrap();

        let err = engine
            .register_configured_jobs(&config.jobs)
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert!(engine.list_jobs().await.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_scheduler_does_not_fire() {
        let mut config = AppConfig::default();
        config.scheduler.enabled = false;
        let engine = TaskEngine::new(&config).unwrap();
        register_echo(&engine).await;
        engine
            .add_date_job("now", Utc::now(), "echo", TaskParams::new())
            .await
            .unwrap();
        engine.start().await;

        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        let stats = engine.get_stats().await;
        assert_eq!(stats.history_size, 0);
        assert_eq!(stats.scheduled_jobs, 1);
        engine.stop().await;
    }

    #[tokio::test]
    async fn test_rebind_while_running_is_rejected() {
        let engine = test_engine(100);
        engine.start().await;
        let err = engine
            .rebind(tokio::runtime::Handle::current())
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::ContextBusy(_)));
        engine.stop().await;
        assert_eq!(
            engine.rebind(tokio::runtime::Handle::current()).await.unwrap(),
            0
        );
    }

    #[test]
    fn test_engine_requires_runtime() {
        let err = TaskEngine::new(&AppConfig::default()).err().unwrap();
        assert!(matches!(err, SchedulerError::Internal(_)));
    }
}

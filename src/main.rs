use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info, warn};

use taskdeck::logging::init_logging;
use taskdeck::shutdown::wait_for_os_signal;
use taskdeck::{Application, ShutdownSignal};
use taskdeck_core::AppConfig;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    // 解析命令行参数
    let matches = Command::new("taskdeck")
        .version(env!("CARGO_PKG_VERSION"))
        .about("媒体自动化任务调度与执行引擎")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径 (默认搜索 config/taskdeck.toml, taskdeck.toml)"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别 (覆盖配置文件)")
                .value_parser(["trace", "debug", "info", "warn", "error"]),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式 (覆盖配置文件)")
                .value_parser(["json", "pretty"]),
        )
        .arg(
            Arg::new("check")
                .long("check")
                .help("校验配置并列出定时任务后退出")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config").map(String::as_str);

    // 加载配置
    let config = AppConfig::load(config_path).with_context(|| match config_path {
        Some(path) => format!("加载配置文件失败: {path}"),
        None => "加载默认配置失败".to_string(),
    })?;

    let log_level = matches
        .get_one::<String>("log-level")
        .cloned()
        .unwrap_or_else(|| config.observability.log_level.clone());
    let log_format = matches
        .get_one::<String>("log-format")
        .cloned()
        .unwrap_or_else(|| config.observability.log_format.clone());

    // 初始化日志系统
    init_logging(&log_level, &log_format)?;

    info!(config = config_path.unwrap_or("<default>"), "启动任务调度引擎");

    if config.observability.metrics_enabled {
        install_metrics_exporter(&config.observability.metrics_bind_address)?;
    }

    let app = Application::new(config).await?;

    if matches.get_flag("check") {
        print_jobs(&app).await;
        return Ok(());
    }

    let shutdown = ShutdownSignal::new();
    let app = Arc::new(app);
    let app_handle = {
        let app = Arc::clone(&app);
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = app.run(shutdown).await {
                error!("应用运行失败: {e:#}");
            }
        })
    };

    // 等待关闭信号
    if let Err(e) = wait_for_os_signal().await {
        error!("监听关闭信号失败: {e}");
    }
    info!("收到关闭信号，开始优雅关闭...");
    shutdown.trigger();

    // 等待应用关闭，设置超时
    match tokio::time::timeout(SHUTDOWN_TIMEOUT, app_handle).await {
        Ok(Ok(())) => info!("应用已优雅关闭"),
        Ok(Err(e)) => error!("应用关闭时发生错误: {e}"),
        Err(_) => warn!("应用关闭超时，强制退出"),
    }

    Ok(())
}

fn install_metrics_exporter(bind_address: &str) -> Result<()> {
    let addr: SocketAddr = bind_address
        .parse()
        .with_context(|| format!("无效的指标监听地址: {bind_address}"))?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("安装Prometheus指标导出器失败")?;
    info!(address = %addr, "Prometheus指标导出器已启动");
    Ok(())
}

async fn print_jobs(app: &Application) {
    let jobs = app.jobs().await;
    println!("configuration OK, {} scheduled job(s)", jobs.len());
    for job in jobs {
        let next = job
            .next_fire_time
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        println!("  {:<24} {:<20} {}  next: {}", job.id, job.task_type, job.trigger, next);
    }
}

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Arg, Command};
use prediction_core::AppConfig;
use prediction_infrastructure::{init_metrics, init_structured_logging, LoggingConfig};
use prediction_scheduler::app::{AppMode, Application};
use prediction_scheduler::shutdown::ShutdownManager;
use tokio::signal;
use tracing::{error, info, warn};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("prediction-scheduler")
        .version(env!("CARGO_PKG_VERSION"))
        .about("传感器时序预测任务调度与执行系统")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径，未指定时按默认路径查找"),
        )
        .arg(
            Arg::new("mode")
                .short('m')
                .long("mode")
                .value_name("MODE")
                .help("运行模式")
                .value_parser(["scheduler", "executor", "all"])
                .default_value("all"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别，覆盖配置文件")
                .value_parser(["trace", "debug", "info", "warn", "error"]),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式，覆盖配置文件")
                .value_parser(["json", "pretty", "compact"]),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config").map(String::as_str);
    let mode_str = matches
        .get_one::<String>("mode")
        .map(String::as_str)
        .unwrap_or("all");

    let mut config = AppConfig::load(config_path)
        .with_context(|| format!("加载配置失败: {}", config_path.unwrap_or("<默认路径>")))?;
    if let Some(level) = matches.get_one::<String>("log-level") {
        config.observability.log_level = level.clone();
    }
    if let Some(format) = matches.get_one::<String>("log-format") {
        config.observability.log_format = format.clone();
    }

    let logging = LoggingConfig::new(
        &config.observability.log_level,
        &config.observability.log_format,
    )
    .map_err(anyhow::Error::msg)?;
    init_structured_logging(logging).context("初始化日志系统失败")?;

    info!("启动传感器预测调度系统");
    info!("配置文件: {}", config_path.unwrap_or("<默认路径>"));
    info!("运行模式: {mode_str}");

    if config.observability.metrics_enabled {
        let address = config.observability.metrics_socket_addr()?;
        init_metrics(address).context("启动指标导出器失败")?;
    }

    let app_mode: AppMode = mode_str.parse()?;
    let app = Arc::new(Application::new(config, app_mode)?);

    let shutdown_manager = ShutdownManager::new();
    let shutdown_rx = shutdown_manager.subscribe().await;
    let mut app_handle = {
        let app = Arc::clone(&app);
        tokio::spawn(async move { app.run(shutdown_rx).await })
    };

    // 组件自行退出（派发失败或执行器连续队列错误）时不再等待信号
    let finished = tokio::select! {
        _ = wait_for_shutdown_signal() => None,
        result = &mut app_handle => Some(result),
    };

    let result = match finished {
        Some(result) => result.context("应用任务异常终止")?,
        None => {
            info!("收到关闭信号，开始优雅关闭...");
            shutdown_manager.shutdown().await;

            match tokio::time::timeout(SHUTDOWN_TIMEOUT, app_handle).await {
                Ok(result) => result.context("应用任务异常终止")?,
                Err(_) => {
                    warn!("应用关闭超时，强制退出");
                    Ok(())
                }
            }
        }
    };

    match &result {
        Ok(()) => info!("传感器预测调度系统已退出"),
        Err(e) => error!("应用运行失败: {e:#}"),
    }
    result
}

/// 等待关闭信号
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("安装Ctrl+C信号处理器失败");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("安装SIGTERM信号处理器失败")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("收到Ctrl+C信号");
        },
        _ = terminate => {
            info!("收到SIGTERM信号");
        },
    }
}

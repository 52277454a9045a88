use std::net::SocketAddr;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use super::structured_logger::{LogFormat, LoggingConfig};

/// 初始化全局日志订阅者
///
/// `RUST_LOG` 优先于配置中的日志级别。
pub fn init_structured_logging(config: LoggingConfig) -> Result<()> {
    let level = config.level.clone();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&config.level))
        .map_err(|e| anyhow::anyhow!("无效的日志级别 {}: {}", config.level, e))?;

    let registry = tracing_subscriber::registry().with(env_filter);

    match config.format {
        LogFormat::Json => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_thread_ids(config.include_thread_id);

            registry.with(fmt_layer).try_init()?;
        }
        LogFormat::Pretty => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .pretty()
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_thread_ids(config.include_thread_id);

            registry.with(fmt_layer).try_init()?;
        }
        LogFormat::Compact => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .compact()
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_thread_ids(config.include_thread_id);

            registry.with(fmt_layer).try_init()?;
        }
    }

    info!(
        logging.format = ?config.format,
        logging.level = %level,
        "Structured logging initialized"
    );

    Ok(())
}

/// 安装 Prometheus 导出器，必须在 tokio 运行时内调用
pub fn init_metrics(bind_address: SocketAddr) -> Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(bind_address)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    info!("Prometheus metrics exporter listening on {}", bind_address);
    Ok(())
}

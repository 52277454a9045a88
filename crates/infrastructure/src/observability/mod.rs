//! 可观测性：结构化日志和指标

pub mod metrics_collector;
pub mod structured_logger;
pub mod telemetry_setup;

pub use metrics_collector::MetricsCollector;
pub use structured_logger::{LogFormat, LoggingConfig, StructuredLogger};
pub use telemetry_setup::{init_metrics, init_structured_logging};

//! 结构化日志
//!
//! 调度和执行过程中的关键事件统一从这里输出，字段名保持一致以便检索。

use std::str::FromStr;

use chrono::{DateTime, Utc};
use prediction_core::{TaskError, TaskErrorKind};
use prediction_domain::entities::Task;
use tracing::{error, info, warn};

/// 日志配置
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub include_location: bool,
    pub include_thread_id: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            other => Err(format!(
                "不支持的日志格式: {other}，支持的格式: json, pretty, compact"
            )),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            include_location: false,
            include_thread_id: false,
        }
    }
}

impl LoggingConfig {
    pub fn new(level: &str, format: &str) -> Result<Self, String> {
        Ok(Self {
            level: level.to_string(),
            format: format.parse()?,
            ..Default::default()
        })
    }
}

/// 结构化事件日志
pub struct StructuredLogger;

impl StructuredLogger {
    pub fn log_catalog_synced(model_count: usize, projects: &[String]) {
        info!(
            event = "catalog_synced",
            catalog.model_count = model_count,
            catalog.projects = ?projects,
            "模型目录已同步"
        );
    }

    pub fn log_catalog_sync_failed(error: &TaskError, kept_model_count: usize) {
        warn!(
            event = "catalog_sync_failed",
            catalog.model_count = kept_model_count,
            error.kind = error.kind().as_str(),
            error = %error,
            "模型目录同步失败，继续使用旧的目录"
        );
    }

    pub fn log_task_dispatched(task: &Task) {
        info!(
            event = "task_dispatched",
            task.project = task.project_name(),
            task.model = task.model_name(),
            task.from = %task.from_time(),
            task.to = %task.to_time(),
            "预测任务已派发"
        );
    }

    pub fn log_malformed_descriptor(project_name: Option<&str>, model_name: Option<&str>) {
        error!(
            event = "malformed_descriptor",
            task.project = project_name.unwrap_or("<missing>"),
            task.model = model_name.unwrap_or("<missing>"),
            "模型描述缺少项目名或模型名，跳过"
        );
    }

    pub fn log_dispatch_summary(
        from_time: DateTime<Utc>,
        to_time: DateTime<Utc>,
        succeeded: usize,
        failed: usize,
        per_project: &str,
    ) {
        info!(
            event = "dispatch_summary",
            task.from = %from_time,
            task.to = %to_time,
            dispatch.succeeded = succeeded,
            dispatch.failed = failed,
            dispatch.per_project = per_project,
            "本轮预测派发完成"
        );
    }

    pub fn log_task_received(task: &Task, message_id: &str, executor_id: &str) {
        info!(
            event = "task_received",
            task.project = task.project_name(),
            task.model = task.model_name(),
            task.from = %task.from_time(),
            task.to = %task.to_time(),
            message.id = message_id,
            executor.id = executor_id,
            "收到预测任务"
        );
    }

    pub fn log_task_completed(task: &Task, revision: &str, output_count: usize, duration_ms: u64) {
        info!(
            event = "task_completed",
            task.project = task.project_name(),
            task.model = task.model_name(),
            task.from = %task.from_time(),
            task.to = %task.to_time(),
            task.revision = revision,
            task.output_count = output_count,
            task.duration_ms = duration_ms,
            "预测任务完成"
        );
    }

    /// 数据缺失和上游错误记为警告，其余记为错误；未知错误输出完整错误链
    pub fn log_task_abandoned(task: &Task, error: &TaskError) {
        match error.kind() {
            TaskErrorKind::DataUnavailable | TaskErrorKind::UpstreamError => warn!(
                event = "task_abandoned",
                task.project = task.project_name(),
                task.model = task.model_name(),
                task.from = %task.from_time(),
                task.to = %task.to_time(),
                error.kind = error.kind().as_str(),
                error = %error,
                "放弃预测任务"
            ),
            TaskErrorKind::TagNotFound => error!(
                event = "task_abandoned",
                task.project = task.project_name(),
                task.model = task.model_name(),
                task.from = %task.from_time(),
                task.to = %task.to_time(),
                error.kind = error.kind().as_str(),
                error = %error,
                "放弃预测任务"
            ),
            TaskErrorKind::Unknown => error!(
                event = "task_abandoned",
                task.project = task.project_name(),
                task.model = task.model_name(),
                task.from = %task.from_time(),
                task.to = %task.to_time(),
                error.kind = error.kind().as_str(),
                error = ?error,
                "放弃预测任务，发生未知错误"
            ),
        }
    }
}

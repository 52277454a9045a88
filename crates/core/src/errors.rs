use std::fmt;

use thiserror::Error;

/// 任务队列错误
///
/// 只描述队列本身的连通性与编解码问题，和单个任务的处理失败分开。
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("消息队列连接丢失: {0}")]
    ConnectionLost(String),
    #[error("任务序列化失败: {0}")]
    SerializationFailed(String),
    #[error("消息队列配置错误: {0}")]
    Configuration(String),
}

impl QueueError {
    pub fn connection_lost<S: Into<String>>(msg: S) -> Self {
        Self::ConnectionLost(msg.into())
    }
    pub fn serialization<S: Into<String>>(msg: S) -> Self {
        Self::SerializationFailed(msg.into())
    }
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationFailed(err.to_string())
    }
}

/// 单个预测任务的失败分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskErrorKind {
    DataUnavailable,
    UpstreamError,
    TagNotFound,
    Unknown,
}

impl TaskErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskErrorKind::DataUnavailable => "data_unavailable",
            TaskErrorKind::UpstreamError => "upstream_error",
            TaskErrorKind::TagNotFound => "tag_not_found",
            TaskErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for TaskErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 预测任务处理错误
///
/// 封闭集合，执行器按种类决定日志级别，任何一种都不会中断执行循环。
#[derive(Debug, Error)]
pub enum TaskError {
    /// 传感器数据缺失或不足
    #[error("数据不可用: {0}")]
    DataUnavailable(String),
    /// 外部服务返回了不可用结果
    #[error("上游服务错误 (status={status:?}): {message}")]
    UpstreamError { status: Option<u16>, message: String },
    /// 输入标签没有对应的时序ID
    #[error("未找到标签: {}", tags.join(", "))]
    TagNotFound { tags: Vec<String> },
    #[error("未知错误: {0:#}")]
    Unknown(#[from] anyhow::Error),
}

impl TaskError {
    pub fn data_unavailable<S: Into<String>>(msg: S) -> Self {
        Self::DataUnavailable(msg.into())
    }

    pub fn upstream<S: Into<String>>(status: Option<u16>, msg: S) -> Self {
        Self::UpstreamError {
            status,
            message: msg.into(),
        }
    }

    pub fn tag_not_found(tags: Vec<String>) -> Self {
        Self::TagNotFound { tags }
    }

    pub fn unknown<S: Into<String>>(msg: S) -> Self {
        Self::Unknown(anyhow::anyhow!(msg.into()))
    }

    pub fn kind(&self) -> TaskErrorKind {
        match self {
            TaskError::DataUnavailable(_) => TaskErrorKind::DataUnavailable,
            TaskError::UpstreamError { .. } => TaskErrorKind::UpstreamError,
            TaskError::TagNotFound { .. } => TaskErrorKind::TagNotFound,
            TaskError::Unknown(_) => TaskErrorKind::Unknown,
        }
    }
}

/// 调度器错误类型定义
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("消息队列错误: {0}")]
    Queue(#[from] QueueError),
    #[error("任务处理错误: {0}")]
    Task(#[from] TaskError),
    #[error("无效的任务参数: {0}")]
    InvalidTaskParams(String),
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("内部错误: {0}")]
    Internal(String),
}

impl SchedulerError {
    pub fn invalid_params<S: Into<String>>(msg: S) -> Self {
        Self::InvalidTaskParams(msg.into())
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    /// 队列连通性错误需要上抛给进程级处理
    pub fn is_queue_error(&self) -> bool {
        matches!(self, SchedulerError::Queue(_))
    }
}

/// 统一的Result类型
pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;

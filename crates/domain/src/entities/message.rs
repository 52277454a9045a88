use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::task::Task;

/// 当前的任务消息格式版本
pub const TASK_SCHEMA_VERSION: u32 = 1;

/// 队列上传输的任务消息
///
/// 自描述的 JSON 信封，`schema_version` 用于拒绝不兼容的生产者。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMessage {
    pub id: String,
    pub schema_version: u32,
    pub task: Task,
    pub enqueued_at: DateTime<Utc>,
}

impl TaskMessage {
    pub fn new(task: Task) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            schema_version: TASK_SCHEMA_VERSION,
            task,
            enqueued_at: Utc::now(),
        }
    }
}

/// 后端相关的投递标识，确认消息时使用
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeliveryTag {
    /// 递增序号（内存队列、RabbitMQ）
    Sequence(u64),
    /// Redis Stream 条目ID
    StreamEntry(String),
}

/// 从队列取出、尚未确认的任务
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedTask {
    pub message_id: String,
    pub task: Task,
    pub delivery_tag: DeliveryTag,
}

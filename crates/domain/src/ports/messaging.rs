use std::time::Duration;

use async_trait::async_trait;
use prediction_core::QueueError;

use crate::entities::{ReceivedTask, Task};

/// 任务队列生产端
#[async_trait]
pub trait TaskSender: Send + Sync {
    /// 序列化并发布任务
    async fn put_task(&self, task: &Task) -> Result<(), QueueError>;

    /// 释放生产端连接，调度器退出时调用
    async fn close(&self) -> Result<(), QueueError>;
}

/// 任务队列消费端
///
/// 投递语义为至少一次：消息在 `ack` 之前可能被重新投递。
#[async_trait]
pub trait TaskReceiver: Send + Sync {
    /// 最多等待 `timeout` 取一个任务。
    ///
    /// 超时或消息无法反序列化时返回 `Ok(None)`；无法反序列化的消息会被记录并丢弃。
    async fn get_task(&self, timeout: Duration) -> Result<Option<ReceivedTask>, QueueError>;

    /// 确认任务已处理完毕
    async fn ack(&self, received: &ReceivedTask) -> Result<(), QueueError>;

    /// 释放消费者资源
    async fn close(&self) -> Result<(), QueueError>;
}

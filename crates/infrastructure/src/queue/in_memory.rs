use async_trait::async_trait;
use prediction_core::QueueError;
use prediction_domain::entities::{DeliveryTag, ReceivedTask, Task};
use prediction_domain::ports::{TaskReceiver, TaskSender};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::codec::TaskCodec;

#[derive(Debug, Default)]
struct InMemoryState {
    ready: VecDeque<(u64, Vec<u8>)>,
    /// 投递标识 -> (消费者, 原始消息)，确认前保留以便重新投递
    in_flight: HashMap<u64, (String, Vec<u8>)>,
    next_tag: u64,
}

/// 内存任务队列
///
/// 适用于单进程部署（`all` 模式）和测试。消息以编码后的字节保存，
/// 与其他后端走同一套编解码；未确认的消息在消费者关闭时放回队首。
#[derive(Debug)]
pub struct InMemoryTaskQueue {
    name: String,
    state: Mutex<InMemoryState>,
    notify: Notify,
    empty_poll_backoff: Duration,
}

impl InMemoryTaskQueue {
    pub fn new<S: Into<String>>(name: S, empty_poll_backoff: Duration) -> Arc<Self> {
        let name = name.into();
        info!("创建内存任务队列: {}", name);
        Arc::new(Self {
            name,
            state: Mutex::new(InMemoryState::default()),
            notify: Notify::new(),
            empty_poll_backoff,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 为指定消费者创建接收端
    pub fn receiver<S: Into<String>>(self: &Arc<Self>, consumer_id: S) -> InMemoryTaskReceiver {
        InMemoryTaskReceiver {
            queue: Arc::clone(self),
            consumer_id: consumer_id.into(),
        }
    }

    /// 直接放入原始字节，用于模拟异常生产者
    pub fn push_raw(&self, payload: Vec<u8>) -> Result<(), QueueError> {
        {
            let mut state = self.lock_state()?;
            state.next_tag += 1;
            let tag = state.next_tag;
            state.ready.push_back((tag, payload));
        }
        self.notify.notify_one();
        Ok(())
    }

    /// 等待投递的消息数量
    pub fn ready_len(&self) -> usize {
        self.state.lock().map(|s| s.ready.len()).unwrap_or(0)
    }

    /// 已投递未确认的消息数量
    pub fn in_flight_len(&self) -> usize {
        self.state.lock().map(|s| s.in_flight.len()).unwrap_or(0)
    }

    fn lock_state(&self) -> Result<std::sync::MutexGuard<'_, InMemoryState>, QueueError> {
        self.state
            .lock()
            .map_err(|e| QueueError::connection_lost(format!("内存队列状态锁已损坏: {e}")))
    }

    fn take_next(&self, consumer_id: &str) -> Result<Option<(u64, Vec<u8>)>, QueueError> {
        let mut state = self.lock_state()?;
        let next = state.ready.pop_front();
        if let Some((tag, payload)) = &next {
            state
                .in_flight
                .insert(*tag, (consumer_id.to_string(), payload.clone()));
        }
        Ok(next)
    }

    fn ack_tag(&self, tag: u64) -> Result<bool, QueueError> {
        Ok(self.lock_state()?.in_flight.remove(&tag).is_some())
    }

    fn requeue_consumer(&self, consumer_id: &str) -> Result<usize, QueueError> {
        let count = {
            let mut state = self.lock_state()?;
            let mut pending: Vec<(u64, Vec<u8>)> = state
                .in_flight
                .iter()
                .filter(|(_, (owner, _))| owner == consumer_id)
                .map(|(tag, (_, payload))| (*tag, payload.clone()))
                .collect();
            for (tag, _) in &pending {
                state.in_flight.remove(tag);
            }
            pending.sort_by_key(|(tag, _)| *tag);
            let count = pending.len();
            for entry in pending.into_iter().rev() {
                state.ready.push_front(entry);
            }
            count
        };
        if count > 0 {
            self.notify.notify_one();
        }
        Ok(count)
    }
}

#[async_trait]
impl TaskSender for InMemoryTaskQueue {
    async fn put_task(&self, task: &Task) -> Result<(), QueueError> {
        let (message, payload) = TaskCodec::encode_task(task)?;
        self.push_raw(payload)?;
        debug!("任务已写入内存队列 {}: message_id={}", self.name, message.id);
        Ok(())
    }

    /// 队列由工厂持有，生产端关闭后消费端仍可继续读取
    async fn close(&self) -> Result<(), QueueError> {
        debug!("内存队列 {} 的生产端已关闭", self.name);
        Ok(())
    }
}

/// 内存队列的接收端
#[derive(Debug, Clone)]
pub struct InMemoryTaskReceiver {
    queue: Arc<InMemoryTaskQueue>,
    consumer_id: String,
}

#[async_trait]
impl TaskReceiver for InMemoryTaskReceiver {
    async fn get_task(&self, timeout: Duration) -> Result<Option<ReceivedTask>, QueueError> {
        let deadline = Instant::now() + timeout;

        loop {
            if let Some((tag, payload)) = self.queue.take_next(&self.consumer_id)? {
                return match TaskCodec::decode(&payload) {
                    Ok(message) => Ok(Some(ReceivedTask {
                        message_id: message.id,
                        task: message.task,
                        delivery_tag: DeliveryTag::Sequence(tag),
                    })),
                    Err(e) => {
                        warn!("丢弃无法解析的任务消息: queue={}, error={}", self.queue.name, e);
                        self.queue.ack_tag(tag)?;
                        Ok(None)
                    }
                };
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            if tokio::time::timeout(deadline - now, self.queue.notify.notified())
                .await
                .is_err()
            {
                break;
            }
        }

        tokio::time::sleep(self.queue.empty_poll_backoff).await;
        Ok(None)
    }

    async fn ack(&self, received: &ReceivedTask) -> Result<(), QueueError> {
        match &received.delivery_tag {
            DeliveryTag::Sequence(tag) => {
                if !self.queue.ack_tag(*tag)? {
                    warn!("确认的消息不存在或已确认: message_id={}", received.message_id);
                }
                Ok(())
            }
            other => Err(QueueError::configuration(format!(
                "内存队列无法确认投递标识: {other:?}"
            ))),
        }
    }

    async fn close(&self) -> Result<(), QueueError> {
        let requeued = self.queue.requeue_consumer(&self.consumer_id)?;
        info!(
            "内存队列消费者已关闭: consumer={}, 重新入队 {} 条未确认消息",
            self.consumer_id, requeued
        );
        Ok(())
    }
}

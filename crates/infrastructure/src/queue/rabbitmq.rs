use async_trait::async_trait;
use futures::StreamExt;
use lapin::{
    options::*, types::FieldTable, BasicProperties, Channel, Connection, ConnectionProperties,
    Consumer,
};
use metrics::counter;
use prediction_core::{QueueError, RabbitMqBackendConfig};
use prediction_domain::entities::{DeliveryTag, ReceivedTask, Task};
use prediction_domain::ports::{TaskReceiver, TaskSender};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::codec::TaskCodec;

/// 建立连接、打开通道并声明任务队列
async fn open_channel(
    config: &RabbitMqBackendConfig,
    queue: &str,
) -> Result<(Connection, Channel), QueueError> {
    let connect = Connection::connect(&config.url, ConnectionProperties::default());
    let connection = timeout(Duration::from_secs(config.connection_timeout_seconds), connect)
        .await
        .map_err(|_| QueueError::connection_lost("连接RabbitMQ超时"))?
        .map_err(|e| QueueError::connection_lost(format!("连接RabbitMQ失败: {e}")))?;

    let channel = connection
        .create_channel()
        .await
        .map_err(|e| QueueError::connection_lost(format!("创建通道失败: {e}")))?;

    channel
        .queue_declare(
            queue,
            QueueDeclareOptions {
                durable: config.durable,
                exclusive: false,
                auto_delete: false,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(|e| QueueError::connection_lost(format!("声明队列 {queue} 失败: {e}")))?;

    debug!("队列 {} 声明成功", queue);
    Ok((connection, channel))
}

async fn close_connection(connection: &Connection) -> Result<(), QueueError> {
    if !connection.status().connected() {
        return Ok(());
    }
    connection
        .close(200, "正常关闭")
        .await
        .map_err(|e| QueueError::connection_lost(format!("关闭连接失败: {e}")))
}

/// RabbitMQ 生产端，开启发布确认
pub struct RabbitMqTaskSender {
    connection: Connection,
    channel: Channel,
    queue: String,
    persistent: bool,
}

impl RabbitMqTaskSender {
    pub async fn connect(config: &RabbitMqBackendConfig, queue: &str) -> Result<Self, QueueError> {
        let (connection, channel) = open_channel(config, queue).await?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| QueueError::connection_lost(format!("开启发布确认失败: {e}")))?;

        info!("RabbitMQ生产端已连接: queue={}", queue);
        Ok(Self {
            connection,
            channel,
            queue: queue.to_string(),
            persistent: config.durable,
        })
    }
}

#[async_trait]
impl TaskSender for RabbitMqTaskSender {
    async fn put_task(&self, task: &Task) -> Result<(), QueueError> {
        let (message, payload) = TaskCodec::encode_task(task)?;
        let properties = if self.persistent {
            BasicProperties::default().with_delivery_mode(2) // 2 = persistent
        } else {
            BasicProperties::default()
        };

        let confirm = self
            .channel
            .basic_publish(
                "",
                &self.queue,
                BasicPublishOptions::default(),
                &payload,
                properties,
            )
            .await
            .map_err(|e| {
                QueueError::connection_lost(format!("发布消息到队列 {} 失败: {e}", self.queue))
            })?;

        // 等待确认
        let confirmation = confirm
            .await
            .map_err(|e| QueueError::connection_lost(format!("消息发布确认失败: {e}")))?;
        if confirmation.is_nack() {
            counter!("prediction_rabbitmq_publish_nacks_total").increment(1);
            return Err(QueueError::connection_lost(format!(
                "RabbitMQ拒绝了消息 {}",
                message.id
            )));
        }

        debug!("消息已发布到队列 {}: message_id={}", self.queue, message.id);
        Ok(())
    }

    async fn close(&self) -> Result<(), QueueError> {
        close_connection(&self.connection).await?;
        info!("RabbitMQ生产端连接已关闭: queue={}", self.queue);
        Ok(())
    }
}

/// RabbitMQ 消费端
///
/// 通过 `basic_consume` 订阅队列，预取数量为 1，手动确认。
/// 等待超时只放弃对消费流的本次轮询，已推送的消息留在消费流中供下次读取。
/// 连接关闭时未确认的消息由代理重新入队。
pub struct RabbitMqTaskReceiver {
    connection: Connection,
    channel: Channel,
    consumer: Mutex<Consumer>,
    queue: String,
    consumer_id: String,
    empty_poll_backoff: Duration,
}

impl RabbitMqTaskReceiver {
    pub async fn connect(
        config: &RabbitMqBackendConfig,
        queue: &str,
        consumer_id: &str,
        empty_poll_backoff: Duration,
    ) -> Result<Self, QueueError> {
        let (connection, channel) = open_channel(config, queue).await?;
        channel
            .basic_qos(1, BasicQosOptions::default())
            .await
            .map_err(|e| QueueError::connection_lost(format!("设置预取数量失败: {e}")))?;

        let consumer = channel
            .basic_consume(
                queue,
                consumer_id,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| QueueError::connection_lost(format!("创建消费者失败: {e}")))?;

        info!("RabbitMQ消费端已连接: queue={}, consumer={}", queue, consumer_id);
        Ok(Self {
            connection,
            channel,
            consumer: Mutex::new(consumer),
            queue: queue.to_string(),
            consumer_id: consumer_id.to_string(),
            empty_poll_backoff,
        })
    }

    async fn ack_tag(&self, tag: u64) -> Result<(), QueueError> {
        self.channel
            .basic_ack(tag, BasicAckOptions::default())
            .await
            .map_err(|e| QueueError::connection_lost(format!("确认消息失败: {e}")))
    }
}

#[async_trait]
impl TaskReceiver for RabbitMqTaskReceiver {
    async fn get_task(&self, wait: Duration) -> Result<Option<ReceivedTask>, QueueError> {
        let next = {
            let mut consumer = self.consumer.lock().await;
            timeout(wait.max(Duration::from_millis(1)), consumer.next()).await
        };

        let delivery = match next {
            Ok(Some(Ok(delivery))) => delivery,
            Ok(Some(Err(e))) => {
                return Err(QueueError::connection_lost(format!(
                    "从队列 {} 接收消息失败: {e}",
                    self.queue
                )))
            }
            Ok(None) => {
                return Err(QueueError::connection_lost(format!(
                    "队列 {} 的消费者已被取消",
                    self.queue
                )))
            }
            Err(_) => {
                sleep(self.empty_poll_backoff).await;
                return Ok(None);
            }
        };

        let tag = delivery.delivery_tag;
        match TaskCodec::decode(&delivery.data) {
            Ok(decoded) => Ok(Some(ReceivedTask {
                message_id: decoded.id,
                task: decoded.task,
                delivery_tag: DeliveryTag::Sequence(tag),
            })),
            Err(e) => {
                warn!("丢弃无法解析的任务消息: queue={}, error={}", self.queue, e);
                counter!("prediction_rabbitmq_deserialization_errors_total").increment(1);
                self.ack_tag(tag).await?;
                Ok(None)
            }
        }
    }

    async fn ack(&self, received: &ReceivedTask) -> Result<(), QueueError> {
        match &received.delivery_tag {
            DeliveryTag::Sequence(tag) => self.ack_tag(*tag).await,
            other => Err(QueueError::configuration(format!(
                "RabbitMQ无法确认投递标识: {other:?}"
            ))),
        }
    }

    async fn close(&self) -> Result<(), QueueError> {
        close_connection(&self.connection).await?;
        info!("RabbitMQ消费端已关闭: consumer={}", self.consumer_id);
        Ok(())
    }
}

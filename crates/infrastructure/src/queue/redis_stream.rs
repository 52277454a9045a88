use async_trait::async_trait;
use metrics::{counter, histogram};
use prediction_core::{QueueError, RedisStreamBackendConfig};
use prediction_domain::entities::{DeliveryTag, ReceivedTask, Task};
use prediction_domain::ports::{TaskReceiver, TaskSender};
use redis::aio::ConnectionManager;
use redis::streams::{StreamId, StreamReadReply};
use redis::Client;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::codec::TaskCodec;

const PAYLOAD_FIELD: &str = "data";
const MESSAGE_ID_FIELD: &str = "message_id";

/// 建立 Redis 连接并确保 Stream 与消费者组存在
async fn connect(config: &RedisStreamBackendConfig, stream: &str) -> Result<ConnectionManager, QueueError> {
    let client = Client::open(config.url.as_str())
        .map_err(|e| QueueError::configuration(format!("创建Redis客户端失败: {e}")))?;

    let mut last_error = None;
    for attempt in 0..config.max_retry_attempts {
        let connect = client.get_connection_manager();
        match tokio::time::timeout(Duration::from_secs(config.connection_timeout_seconds), connect).await {
            Ok(Ok(mut conn)) => {
                ensure_consumer_group(&mut conn, stream, &config.consumer_group).await?;
                if attempt > 0 {
                    debug!("Successfully reconnected to Redis after {} attempts", attempt + 1);
                }
                return Ok(conn);
            }
            Ok(Err(e)) => last_error = Some(e.to_string()),
            Err(_) => last_error = Some("connection timed out".to_string()),
        }

        counter!("prediction_redis_connection_errors_total").increment(1);
        if attempt + 1 < config.max_retry_attempts {
            warn!(
                "Failed to connect to Redis (attempt {}/{}): {}. Retrying in {}s...",
                attempt + 1,
                config.max_retry_attempts,
                last_error.as_deref().unwrap_or("unknown"),
                config.retry_delay_seconds
            );
            sleep(Duration::from_secs(config.retry_delay_seconds)).await;
        }
    }

    let error_msg = format!(
        "Failed to connect to Redis after {} attempts. Last error: {}",
        config.max_retry_attempts,
        last_error.unwrap_or_else(|| "Unknown".to_string())
    );
    error!("{}", error_msg);
    Err(QueueError::connection_lost(error_msg))
}

async fn ensure_consumer_group(
    conn: &mut ConnectionManager,
    stream: &str,
    group: &str,
) -> Result<(), QueueError> {
    let result: redis::RedisResult<String> = redis::cmd("XGROUP")
        .arg("CREATE")
        .arg(stream)
        .arg(group)
        .arg("0") // 从Stream开始读取
        .arg("MKSTREAM") // 如果Stream不存在则创建
        .query_async(conn)
        .await;

    match result {
        Ok(_) => {
            debug!("Successfully created consumer group: {} on {}", group, stream);
            Ok(())
        }
        Err(e) if e.to_string().contains("BUSYGROUP") => {
            debug!("Consumer group {} already exists", group);
            Ok(())
        }
        Err(e) => Err(QueueError::connection_lost(format!(
            "Failed to create consumer group {group}: {e}"
        ))),
    }
}

fn map_redis_error(context: &str, err: redis::RedisError) -> QueueError {
    counter!("prediction_redis_command_errors_total").increment(1);
    QueueError::connection_lost(format!("{context}: {err}"))
}

/// Redis Stream 生产端
pub struct RedisStreamTaskSender {
    conn: ConnectionManager,
    stream: String,
}

impl RedisStreamTaskSender {
    pub async fn connect(config: &RedisStreamBackendConfig, stream: &str) -> Result<Self, QueueError> {
        let conn = connect(config, stream).await?;
        info!("Redis Stream生产端已连接: stream={}", stream);
        Ok(Self {
            conn,
            stream: stream.to_string(),
        })
    }
}

#[async_trait]
impl TaskSender for RedisStreamTaskSender {
    async fn put_task(&self, task: &Task) -> Result<(), QueueError> {
        let start = Instant::now();
        let (message, payload) = TaskCodec::encode_task(task)?;
        let mut conn = self.conn.clone();

        let stream_id: String = redis::cmd("XADD")
            .arg(&self.stream)
            .arg("*") // 让Redis自动生成ID
            .arg(MESSAGE_ID_FIELD)
            .arg(&message.id)
            .arg(PAYLOAD_FIELD)
            .arg(payload)
            .query_async(&mut conn)
            .await
            .map_err(|e| map_redis_error("Failed to publish task to Redis Stream", e))?;

        histogram!("prediction_redis_publish_duration_ms").record(start.elapsed().as_millis() as f64);
        debug!(
            "Published task {} to stream {} with Redis Stream ID: {}",
            message.id, self.stream, stream_id
        );
        Ok(())
    }

    async fn close(&self) -> Result<(), QueueError> {
        // ConnectionManager 在最后一个克隆被释放时断开
        info!("Redis Stream生产端已关闭: stream={}", self.stream);
        Ok(())
    }
}

/// Redis Stream 消费端
///
/// 启动后先读取本消费者名下未确认的条目（上次进程退出前未完成的任务），
/// 读完后再读取新条目。
pub struct RedisStreamTaskReceiver {
    conn: ConnectionManager,
    stream: String,
    group: String,
    consumer_id: String,
    empty_poll_backoff: Duration,
    pending_drained: AtomicBool,
}

impl RedisStreamTaskReceiver {
    pub async fn connect(
        config: &RedisStreamBackendConfig,
        stream: &str,
        consumer_id: &str,
        empty_poll_backoff: Duration,
    ) -> Result<Self, QueueError> {
        let conn = connect(config, stream).await?;
        info!(
            "Redis Stream消费端已连接: stream={}, group={}, consumer={}",
            stream, config.consumer_group, consumer_id
        );
        Ok(Self {
            conn,
            stream: stream.to_string(),
            group: config.consumer_group.clone(),
            consumer_id: consumer_id.to_string(),
            empty_poll_backoff,
            pending_drained: AtomicBool::new(false),
        })
    }

    async fn read_one(&self, start_id: &str, block: Option<Duration>) -> Result<Option<StreamId>, QueueError> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(&self.group)
            .arg(&self.consumer_id)
            .arg("COUNT")
            .arg(1);
        if let Some(block) = block {
            cmd.arg("BLOCK").arg(block.as_millis().max(1) as u64);
        }
        cmd.arg("STREAMS").arg(&self.stream).arg(start_id);

        let reply: Option<StreamReadReply> = cmd
            .query_async(&mut conn)
            .await
            .map_err(|e| map_redis_error("Failed to read from Redis Stream", e))?;

        Ok(reply
            .and_then(|r| r.keys.into_iter().next())
            .and_then(|key| key.ids.into_iter().next()))
    }

    async fn xack(&self, stream_id: &str) -> Result<i64, QueueError> {
        let mut conn = self.conn.clone();
        redis::cmd("XACK")
            .arg(&self.stream)
            .arg(&self.group)
            .arg(stream_id)
            .query_async(&mut conn)
            .await
            .map_err(|e| map_redis_error("Failed to acknowledge Redis Stream entry", e))
    }

    /// 解析条目；无法解析的条目确认后丢弃
    async fn decode_entry(&self, entry: StreamId) -> Result<Option<ReceivedTask>, QueueError> {
        let payload: Option<Vec<u8>> = entry.get(PAYLOAD_FIELD);
        let decoded = match payload {
            Some(payload) => TaskCodec::decode(&payload),
            None => Err(QueueError::serialization(format!(
                "Stream entry {} missing '{}' field",
                entry.id, PAYLOAD_FIELD
            ))),
        };

        match decoded {
            Ok(message) => {
                counter!("prediction_redis_messages_consumed_total").increment(1);
                Ok(Some(ReceivedTask {
                    message_id: message.id,
                    task: message.task,
                    delivery_tag: DeliveryTag::StreamEntry(entry.id),
                }))
            }
            Err(e) => {
                warn!("丢弃无法解析的Stream条目 {}: {}", entry.id, e);
                counter!("prediction_redis_deserialization_errors_total").increment(1);
                self.xack(&entry.id).await?;
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl TaskReceiver for RedisStreamTaskReceiver {
    async fn get_task(&self, timeout: Duration) -> Result<Option<ReceivedTask>, QueueError> {
        if !self.pending_drained.load(Ordering::Relaxed) {
            match self.read_one("0", None).await? {
                Some(entry) => {
                    debug!("重新处理未确认的Stream条目: {}", entry.id);
                    return self.decode_entry(entry).await;
                }
                None => self.pending_drained.store(true, Ordering::Relaxed),
            }
        }

        match self.read_one(">", Some(timeout)).await? {
            Some(entry) => self.decode_entry(entry).await,
            None => {
                sleep(self.empty_poll_backoff).await;
                Ok(None)
            }
        }
    }

    async fn ack(&self, received: &ReceivedTask) -> Result<(), QueueError> {
        let DeliveryTag::StreamEntry(stream_id) = &received.delivery_tag else {
            return Err(QueueError::configuration(format!(
                "Redis Stream无法确认投递标识: {:?}",
                received.delivery_tag
            )));
        };

        let acked = self.xack(stream_id).await?;
        if acked == 0 {
            warn!(
                "Message {} was not acknowledged (possibly already processed)",
                received.message_id
            );
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), QueueError> {
        // 未确认的条目留在消费者组的待处理列表中，同名消费者重启后会重新读取
        info!("Redis Stream消费端已关闭: consumer={}", self.consumer_id);
        Ok(())
    }
}

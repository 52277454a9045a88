use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 任务队列后端
///
/// 每个后端携带自己的配置结构，工厂按变体穷举匹配。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskQueueBackendConfig {
    /// 进程内队列，只适用于 `all` 模式和测试
    #[default]
    InMemory,
    RedisStream(RedisStreamBackendConfig),
    Rabbitmq(RabbitMqBackendConfig),
}

impl TaskQueueBackendConfig {
    pub fn name(&self) -> &'static str {
        match self {
            TaskQueueBackendConfig::InMemory => "in_memory",
            TaskQueueBackendConfig::RedisStream(_) => "redis_stream",
            TaskQueueBackendConfig::Rabbitmq(_) => "rabbitmq",
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        match self {
            TaskQueueBackendConfig::InMemory => Ok(()),
            TaskQueueBackendConfig::RedisStream(config) => config.validate(),
            TaskQueueBackendConfig::Rabbitmq(config) => config.validate(),
        }
    }
}

/// Redis Stream 后端配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RedisStreamBackendConfig {
    pub url: String,
    #[serde(default = "default_consumer_group")]
    pub consumer_group: String,
    #[serde(default = "default_connection_timeout_seconds")]
    pub connection_timeout_seconds: u64,
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
    #[serde(default = "default_retry_delay_seconds")]
    pub retry_delay_seconds: u64,
}

impl RedisStreamBackendConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        let parsed = url::Url::parse(&self.url)
            .map_err(|e| anyhow::anyhow!("无效的Redis URL: {}: {}", self.url, e))?;

        if parsed.scheme() != "redis" && parsed.scheme() != "rediss" {
            return Err(anyhow::anyhow!("Redis URL必须是redis://或rediss://格式"));
        }

        if parsed.host_str().map(str::is_empty).unwrap_or(true) {
            return Err(anyhow::anyhow!("Redis主机地址不能为空"));
        }

        if self.consumer_group.trim().is_empty() {
            return Err(anyhow::anyhow!("Redis消费者组名称不能为空"));
        }

        if self.connection_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("Redis连接超时时间必须大于0"));
        }

        if self.max_retry_attempts == 0 {
            return Err(anyhow::anyhow!("Redis最大重试次数必须大于0"));
        }

        Ok(())
    }
}

/// RabbitMQ 后端配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RabbitMqBackendConfig {
    pub url: String,
    #[serde(default = "default_durable")]
    pub durable: bool,
    #[serde(default = "default_connection_timeout_seconds")]
    pub connection_timeout_seconds: u64,
}

impl RabbitMqBackendConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.url.is_empty() {
            return Err(anyhow::anyhow!("RabbitMQ URL不能为空"));
        }

        if !self.url.starts_with("amqp://") && !self.url.starts_with("amqps://") {
            return Err(anyhow::anyhow!("RabbitMQ URL必须是AMQP格式"));
        }

        if self.connection_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("RabbitMQ连接超时时间必须大于0"));
        }

        Ok(())
    }
}

/// 任务队列配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TaskQueueConfig {
    pub queue_name: String,
    /// 空轮询后的退避时间（毫秒）
    pub empty_poll_backoff_ms: u64,
    pub backend: TaskQueueBackendConfig,
}

impl Default for TaskQueueConfig {
    fn default() -> Self {
        Self {
            queue_name: "prediction_tasks".to_string(),
            empty_poll_backoff_ms: 1000,
            backend: TaskQueueBackendConfig::default(),
        }
    }
}

impl TaskQueueConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.queue_name.trim().is_empty() {
            return Err(anyhow::anyhow!("任务队列名称不能为空"));
        }

        self.backend.validate()
    }

    pub fn empty_poll_backoff(&self) -> Duration {
        Duration::from_millis(self.empty_poll_backoff_ms)
    }
}

fn default_consumer_group() -> String {
    "prediction-executors".to_string()
}

fn default_connection_timeout_seconds() -> u64 {
    30
}

fn default_max_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_seconds() -> u64 {
    1
}

fn default_durable() -> bool {
    true
}

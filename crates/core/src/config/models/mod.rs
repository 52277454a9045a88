pub mod app_config;
pub mod endpoints_observability;
pub mod scheduler_executor;
pub mod task_queue;

pub use app_config::{AppConfig, ENV_PREFIX};
pub use endpoints_observability::{HttpEndpointConfig, ObservabilityConfig};
pub use scheduler_executor::{ExecutorConfig, SchedulerConfig};
pub use task_queue::{
    RabbitMqBackendConfig, RedisStreamBackendConfig, TaskQueueBackendConfig, TaskQueueConfig,
};

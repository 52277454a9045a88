//! 任务队列后端

pub mod factory;
pub mod in_memory;
pub mod rabbitmq;
pub mod redis_stream;

pub use factory::{mask_url, TaskQueueFactory};
pub use in_memory::{InMemoryTaskQueue, InMemoryTaskReceiver};
pub use rabbitmq::{RabbitMqTaskReceiver, RabbitMqTaskSender};
pub use redis_stream::{RedisStreamTaskReceiver, RedisStreamTaskSender};

//! 预测任务执行器
//!
//! 从任务队列取出预测任务，拉取传感器数据、调用模型推理并存储结果。

pub mod executor;
pub mod pipeline;
pub mod predictor;

pub use executor::{Executor, ExecutorBuilder, TaskOutcome};
pub use pipeline::{PipelineReport, PredictionPipeline, TaskStage};
pub use predictor::{ClientPool, SensorBackedPredictor, ServingClientFactory};

//! 预测调度器
//!
//! 周期性同步模型目录，并为每个已知模型向任务队列派发预测任务。

pub mod catalog;
pub mod scheduler;
pub mod timer;

pub use catalog::ModelCatalog;
pub use scheduler::{DispatchCount, DispatchSummary, PredictionScheduler, SchedulerState};
pub use timer::Timer;

pub mod entities;
pub mod ports;

pub use entities::*;
pub use ports::*;
pub use prediction_core::{QueueError, SchedulerError, SchedulerResult, TaskError, TaskErrorKind};

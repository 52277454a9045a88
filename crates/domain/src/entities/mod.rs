pub mod message;
pub mod model;
pub mod prediction;
pub mod task;

pub use message::{DeliveryTag, ReceivedTask, TaskMessage, TASK_SCHEMA_VERSION};
pub use model::{ModelDescriptor, ModelSpec, ModelTrainingPeriod};
pub use prediction::{
    DataPoint, OutputSeries, PredictionMetadata, PredictionResult, SensorDataSet,
    StoredPrediction,
};
pub use task::Task;

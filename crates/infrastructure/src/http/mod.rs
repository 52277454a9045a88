//! 协作服务的 HTTP 适配器

pub mod client;
pub mod model_info;
pub mod model_serving;
pub mod sensor_data;
pub mod storage;

pub use client::{status_error, ApiClient};
pub use model_info::HttpModelInfoProvider;
pub use model_serving::HttpModelServingClient;
pub use sensor_data::HttpSensorDataProvider;
pub use storage::{HttpMetadataStorage, HttpPredictionStorage};

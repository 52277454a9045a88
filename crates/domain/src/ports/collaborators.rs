use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use prediction_core::TaskError;

use crate::entities::{
    ModelDescriptor, ModelSpec, ModelTrainingPeriod, OutputSeries, PredictionResult,
    SensorDataSet, StoredPrediction, Task,
};

/// 模型信息服务
#[async_trait]
pub trait ModelInfoProvider: Send + Sync {
    /// 获取项目过滤器匹配的所有模型，过滤器为空表示所有项目
    async fn get_all_models(&self, projects: &[String]) -> Result<Vec<ModelDescriptor>, TaskError>;

    async fn get_project_latest_revision(&self, project_name: &str) -> Result<String, TaskError>;

    async fn get_model_training_dates(
        &self,
        project_name: &str,
        model_name: &str,
        revision: &str,
    ) -> Result<ModelTrainingPeriod, TaskError>;

    async fn get_spec(&self, project_name: &str, model_name: &str)
        -> Result<ModelSpec, TaskError>;
}

/// 传感器数据服务
#[async_trait]
pub trait SensorDataProvider: Send + Sync {
    async fn get_data_for_range(
        &self,
        tags: &[String],
        from_time: DateTime<Utc>,
        to_time: DateTime<Utc>,
    ) -> Result<SensorDataSet, TaskError>;

    /// 标签名 -> 时序ID，没有ID的标签不出现在结果中
    async fn get_time_series_ids(
        &self,
        tags: &[String],
    ) -> Result<BTreeMap<String, String>, TaskError>;
}

/// 模型推理服务客户端
#[async_trait]
pub trait ModelServingClient: Send + Sync {
    async fn predict(
        &self,
        project_name: &str,
        model_name: &str,
        revision: &str,
        data: &SensorDataSet,
    ) -> Result<Vec<OutputSeries>, TaskError>;
}

/// 预测执行
#[async_trait]
pub trait Predictor: Send + Sync {
    async fn execute_prediction(
        &self,
        task: &Task,
        revision: &str,
        training_period: &ModelTrainingPeriod,
    ) -> Result<PredictionResult, TaskError>;
}

/// 预测值存储，同一输出标签和时间戳的重复写入覆盖旧值
#[async_trait]
pub trait PredictionStorage: Send + Sync {
    async fn put_prediction(&self, result: &PredictionResult)
        -> Result<StoredPrediction, TaskError>;
}

/// 预测元数据存储
#[async_trait]
pub trait MetadataStorage: Send + Sync {
    async fn put_prediction_metadata(
        &self,
        result: &PredictionResult,
        output_tag_names: &BTreeMap<String, String>,
        output_time_series_ids: &BTreeMap<String, String>,
        input_time_series_ids: &BTreeMap<String, String>,
    ) -> Result<(), TaskError>;
}

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use prediction_core::{HttpEndpointConfig, SchedulerResult, TaskError};
use prediction_domain::entities::{
    DataPoint, ModelTrainingPeriod, PredictionResult, StoredPrediction,
};
use prediction_domain::ports::{MetadataStorage, PredictionStorage};
use serde::{Deserialize, Serialize};

use super::ApiClient;

#[derive(Debug, Serialize, PartialEq)]
struct TagSeries<'a> {
    tag: String,
    points: &'a [DataPoint],
}

#[derive(Debug, Serialize, PartialEq)]
struct WritePredictionRequest<'a> {
    series: Vec<TagSeries<'a>>,
}

#[derive(Debug, Deserialize)]
struct WritePredictionResponse {
    #[serde(default)]
    time_series_ids: BTreeMap<String, String>,
}

/// 按确定的输出标签名组织写入请求，重复写入覆盖同一标签和时间戳上的值
fn write_request(result: &PredictionResult) -> WritePredictionRequest<'_> {
    WritePredictionRequest {
        series: result
            .series
            .iter()
            .map(|series| TagSeries {
                tag: result.output_tag_name(&series.name),
                points: &series.points,
            })
            .collect(),
    }
}

/// 预测值存储的 HTTP 实现
pub struct HttpPredictionStorage {
    api: ApiClient,
}

impl HttpPredictionStorage {
    pub fn new(endpoint: &HttpEndpointConfig) -> SchedulerResult<Self> {
        Ok(Self {
            api: ApiClient::new("prediction-storage", endpoint)?,
        })
    }
}

#[async_trait]
impl PredictionStorage for HttpPredictionStorage {
    async fn put_prediction(
        &self,
        result: &PredictionResult,
    ) -> Result<StoredPrediction, TaskError> {
        let request = write_request(result);
        let response: WritePredictionResponse =
            self.api.post_json(&["predictions"], &request).await?;

        let output_tag_names = result.output_tag_names();
        let missing: Vec<String> = output_tag_names
            .values()
            .filter(|tag| !response.time_series_ids.contains_key(*tag))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(TaskError::upstream(
                None,
                format!("存储服务没有返回输出标签的时序ID: {}", missing.join(", ")),
            ));
        }

        Ok(StoredPrediction {
            output_tag_names,
            output_time_series_ids: response.time_series_ids,
        })
    }
}

#[derive(Debug, Serialize, PartialEq)]
struct MetadataDocument<'a> {
    project_name: &'a str,
    model_name: &'a str,
    revision: &'a str,
    training_period: ModelTrainingPeriod,
    from_time: DateTime<Utc>,
    to_time: DateTime<Utc>,
    output_tag_names: &'a BTreeMap<String, String>,
    output_time_series_ids: &'a BTreeMap<String, String>,
    input_time_series_ids: &'a BTreeMap<String, String>,
}

/// 预测元数据存储的 HTTP 实现
///
/// 文档按 (项目, 模型, 时间窗口) 寻址并用 PUT 写入，重复处理时覆盖。
pub struct HttpMetadataStorage {
    api: ApiClient,
}

impl HttpMetadataStorage {
    pub fn new(endpoint: &HttpEndpointConfig) -> SchedulerResult<Self> {
        Ok(Self {
            api: ApiClient::new("metadata-storage", endpoint)?,
        })
    }
}

#[async_trait]
impl MetadataStorage for HttpMetadataStorage {
    async fn put_prediction_metadata(
        &self,
        result: &PredictionResult,
        output_tag_names: &BTreeMap<String, String>,
        output_time_series_ids: &BTreeMap<String, String>,
        input_time_series_ids: &BTreeMap<String, String>,
    ) -> Result<(), TaskError> {
        let metadata = &result.metadata;
        let document = MetadataDocument {
            project_name: &metadata.project_name,
            model_name: &metadata.model_name,
            revision: &metadata.revision,
            training_period: metadata.training_period,
            from_time: result.from_time,
            to_time: result.to_time,
            output_tag_names,
            output_time_series_ids,
            input_time_series_ids,
        };
        let window = format!("{}_{}", result.from_time.to_rfc3339(), result.to_time.to_rfc3339());

        self.api
            .put_json(
                &[
                    "metadata",
                    &metadata.project_name,
                    &metadata.model_name,
                    &window,
                ],
                &document,
            )
            .await
    }
}

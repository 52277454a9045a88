use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use prediction_core::{HttpEndpointConfig, SchedulerResult, TaskError};
use prediction_domain::entities::SensorDataSet;
use prediction_domain::ports::SensorDataProvider;
use serde::{Deserialize, Serialize};

use super::ApiClient;

#[derive(Debug, Serialize)]
struct DataQuery<'a> {
    tags: &'a [String],
    from_time: DateTime<Utc>,
    to_time: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct TimeSeriesIdQuery<'a> {
    tags: &'a [String],
}

#[derive(Debug, Deserialize)]
struct TimeSeriesIdResponse {
    #[serde(default)]
    ids: BTreeMap<String, String>,
}

/// 传感器数据服务的 HTTP 实现
pub struct HttpSensorDataProvider {
    api: ApiClient,
}

impl HttpSensorDataProvider {
    pub fn new(endpoint: &HttpEndpointConfig) -> SchedulerResult<Self> {
        Ok(Self {
            api: ApiClient::new("sensor-data", endpoint)?,
        })
    }
}

#[async_trait]
impl SensorDataProvider for HttpSensorDataProvider {
    async fn get_data_for_range(
        &self,
        tags: &[String],
        from_time: DateTime<Utc>,
        to_time: DateTime<Utc>,
    ) -> Result<SensorDataSet, TaskError> {
        let query = DataQuery {
            tags,
            from_time,
            to_time,
        };
        let data: SensorDataSet = self.api.post_json(&["data", "query"], &query).await?;

        if !data.is_well_formed() {
            return Err(TaskError::upstream(
                None,
                format!(
                    "传感器数据形状不一致: {} 列, {} 个时间戳, {} 行",
                    data.tags.len(),
                    data.index.len(),
                    data.values.len()
                ),
            ));
        }
        Ok(data)
    }

    async fn get_time_series_ids(
        &self,
        tags: &[String],
    ) -> Result<BTreeMap<String, String>, TaskError> {
        if tags.is_empty() {
            return Ok(BTreeMap::new());
        }
        let response: TimeSeriesIdResponse = self
            .api
            .post_json(&["time-series", "ids"], &TimeSeriesIdQuery { tags })
            .await?;
        Ok(response.ids)
    }
}

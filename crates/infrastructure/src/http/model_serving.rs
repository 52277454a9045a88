use async_trait::async_trait;
use prediction_core::{HttpEndpointConfig, SchedulerResult, TaskError};
use prediction_domain::entities::{OutputSeries, SensorDataSet};
use prediction_domain::ports::ModelServingClient;
use serde::Deserialize;
use tracing::debug;

use super::ApiClient;

#[derive(Debug, Deserialize)]
struct PredictResponse {
    series: Vec<OutputSeries>,
}

/// 模型推理服务的 HTTP 实现，每个项目一个实例
pub struct HttpModelServingClient {
    project_name: String,
    api: ApiClient,
}

impl HttpModelServingClient {
    pub fn new(project_name: &str, endpoint: &HttpEndpointConfig) -> SchedulerResult<Self> {
        debug!("创建模型推理客户端: project={}", project_name);
        Ok(Self {
            project_name: project_name.to_string(),
            api: ApiClient::new("model-serving", endpoint)?,
        })
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }
}

#[async_trait]
impl ModelServingClient for HttpModelServingClient {
    async fn predict(
        &self,
        project_name: &str,
        model_name: &str,
        revision: &str,
        data: &SensorDataSet,
    ) -> Result<Vec<OutputSeries>, TaskError> {
        if project_name != self.project_name {
            return Err(TaskError::unknown(format!(
                "模型推理客户端属于项目 {}，不能用于项目 {}",
                self.project_name, project_name
            )));
        }

        let response: PredictResponse = self
            .api
            .post_json(
                &[
                    "projects",
                    project_name,
                    "models",
                    model_name,
                    "revisions",
                    revision,
                    "predict",
                ],
                data,
            )
            .await?;

        if response.series.is_empty() {
            return Err(TaskError::upstream(
                None,
                format!("模型 {project_name}/{model_name} 没有返回任何输出序列"),
            ));
        }
        Ok(response.series)
    }
}

use async_trait::async_trait;
use prediction_core::{HttpEndpointConfig, SchedulerResult, TaskError};
use prediction_domain::entities::{ModelDescriptor, ModelSpec, ModelTrainingPeriod};
use prediction_domain::ports::ModelInfoProvider;
use serde::Deserialize;

use super::ApiClient;

#[derive(Debug, Deserialize)]
struct RevisionResponse {
    revision: String,
}

/// 模型信息服务的 HTTP 实现
pub struct HttpModelInfoProvider {
    api: ApiClient,
}

impl HttpModelInfoProvider {
    pub fn new(endpoint: &HttpEndpointConfig) -> SchedulerResult<Self> {
        Ok(Self {
            api: ApiClient::new("model-info", endpoint)?,
        })
    }
}

#[async_trait]
impl ModelInfoProvider for HttpModelInfoProvider {
    async fn get_all_models(&self, projects: &[String]) -> Result<Vec<ModelDescriptor>, TaskError> {
        let query: Vec<(&str, &str)> = projects.iter().map(|p| ("project", p.as_str())).collect();
        self.api.get_json(&["models"], &query).await
    }

    async fn get_project_latest_revision(&self, project_name: &str) -> Result<String, TaskError> {
        let response: RevisionResponse = self
            .api
            .get_json(&["projects", project_name, "revisions", "latest"], &[])
            .await?;
        if response.revision.trim().is_empty() {
            return Err(TaskError::upstream(
                None,
                format!("项目 {project_name} 没有可用的模型版本"),
            ));
        }
        Ok(response.revision)
    }

    async fn get_model_training_dates(
        &self,
        project_name: &str,
        model_name: &str,
        revision: &str,
    ) -> Result<ModelTrainingPeriod, TaskError> {
        self.api
            .get_json(
                &[
                    "projects",
                    project_name,
                    "models",
                    model_name,
                    "revisions",
                    revision,
                    "training-period",
                ],
                &[],
            )
            .await
    }

    async fn get_spec(&self, project_name: &str, model_name: &str) -> Result<ModelSpec, TaskError> {
        self.api
            .get_json(&["projects", project_name, "models", model_name, "spec"], &[])
            .await
    }
}

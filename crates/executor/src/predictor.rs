use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use prediction_core::{SchedulerResult, TaskError};
use prediction_domain::entities::{
    ModelTrainingPeriod, PredictionMetadata, PredictionResult, Task,
};
use prediction_domain::ports::{ModelInfoProvider, ModelServingClient, Predictor, SensorDataProvider};
use tracing::{debug, info};

/// 按项目名创建模型推理客户端
pub type ServingClientFactory =
    Arc<dyn Fn(&str) -> SchedulerResult<Arc<dyn ModelServingClient>> + Send + Sync>;

/// 按项目缓存的模型推理客户端
///
/// 启动时为已配置的项目预先创建，运行中首次出现的项目按需创建。
pub struct ClientPool {
    factory: ServingClientFactory,
    clients: RwLock<HashMap<String, Arc<dyn ModelServingClient>>>,
}

impl ClientPool {
    pub fn new(factory: ServingClientFactory) -> Self {
        Self {
            factory,
            clients: RwLock::new(HashMap::new()),
        }
    }

    pub fn warm_up(&self, projects: &[String]) -> SchedulerResult<()> {
        for project in projects {
            self.get_or_create(project)?;
        }
        info!("模型推理客户端已预先创建: {} 个项目", projects.len());
        Ok(())
    }

    pub fn get(&self, project_name: &str) -> Result<Arc<dyn ModelServingClient>, TaskError> {
        self.get_or_create(project_name).map_err(|e| {
            TaskError::unknown(format!("无法为项目 {project_name} 创建模型推理客户端: {e}"))
        })
    }

    pub fn len(&self) -> usize {
        self.clients.read().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get_or_create(&self, project_name: &str) -> SchedulerResult<Arc<dyn ModelServingClient>> {
        {
            let clients = self.clients.read().unwrap_or_else(|e| e.into_inner());
            if let Some(client) = clients.get(project_name) {
                return Ok(Arc::clone(client));
            }
        }

        let mut clients = self.clients.write().unwrap_or_else(|e| e.into_inner());
        if let Some(client) = clients.get(project_name) {
            return Ok(Arc::clone(client));
        }
        let client = (self.factory)(project_name)?;
        clients.insert(project_name.to_string(), Arc::clone(&client));
        debug!("创建项目 {} 的模型推理客户端", project_name);
        Ok(client)
    }
}

/// 基于传感器数据的预测器
///
/// 读取模型的输入标签，拉取任务时间窗口内的传感器数据，交给该项目的推理客户端评分。
pub struct SensorBackedPredictor {
    model_info: Arc<dyn ModelInfoProvider>,
    sensor_data: Arc<dyn SensorDataProvider>,
    clients: Arc<ClientPool>,
    min_data_points: usize,
}

impl SensorBackedPredictor {
    pub fn new(
        model_info: Arc<dyn ModelInfoProvider>,
        sensor_data: Arc<dyn SensorDataProvider>,
        clients: Arc<ClientPool>,
        min_data_points: usize,
    ) -> Self {
        Self {
            model_info,
            sensor_data,
            clients,
            min_data_points,
        }
    }
}

#[async_trait]
impl Predictor for SensorBackedPredictor {
    async fn execute_prediction(
        &self,
        task: &Task,
        revision: &str,
        training_period: &ModelTrainingPeriod,
    ) -> Result<PredictionResult, TaskError> {
        let project_name = task.project_name();
        let model_name = task.model_name();

        let spec = self.model_info.get_spec(project_name, model_name).await?;
        if spec.tag_list.is_empty() {
            return Err(TaskError::upstream(
                None,
                format!("模型 {project_name}/{model_name} 没有输入标签"),
            ));
        }

        let data = self
            .sensor_data
            .get_data_for_range(&spec.tag_list, task.from_time(), task.to_time())
            .await?;
        if data.row_count() < self.min_data_points {
            return Err(TaskError::data_unavailable(format!(
                "{project_name}/{model_name} 在 [{}, {}] 内只有 {} 行数据，至少需要 {} 行",
                task.from_time(),
                task.to_time(),
                data.row_count(),
                self.min_data_points
            )));
        }

        let client = self.clients.get(project_name)?;
        let series = client
            .predict(project_name, model_name, revision, &data)
            .await?;

        Ok(PredictionResult {
            metadata: PredictionMetadata {
                project_name: project_name.to_string(),
                model_name: model_name.to_string(),
                revision: revision.to_string(),
                training_period: *training_period,
                input_tags: spec.tag_list,
            },
            from_time: task.from_time(),
            to_time: task.to_time(),
            series,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prediction_core::{SchedulerError, TaskErrorKind};
    use prediction_testing_utils::{
        default_training_period, descriptor, MockModelInfoProvider, MockModelServingClient,
        MockSensorDataProvider, TaskBuilder,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn pool_with(client: MockModelServingClient) -> Arc<ClientPool> {
        Arc::new(ClientPool::new(Arc::new(
            move |_project: &str| -> SchedulerResult<Arc<dyn ModelServingClient>> {
                Ok(Arc::new(client.clone()))
            },
        )))
    }

    #[tokio::test]
    async fn test_prediction_uses_spec_tags_and_task_window() {
        let model_info = Arc::new(MockModelInfoProvider::with_models(vec![descriptor("p1", "m1")]));
        let sensor_data = Arc::new(MockSensorDataProvider::new());
        let serving = MockModelServingClient::new(vec!["anomaly-score".into()]);
        let predictor =
            SensorBackedPredictor::new(model_info, sensor_data.clone(), pool_with(serving.clone()), 1);
        let task = TaskBuilder::new().build();

        let result = predictor
            .execute_prediction(&task, "r1", &default_training_period())
            .await
            .unwrap();

        assert_eq!(result.metadata.input_tags, vec!["p1-m1-tag"]);
        assert_eq!(result.metadata.revision, "r1");
        assert_eq!(result.series.len(), 1);
        let (tags, from, to) = sensor_data.data_calls()[0].clone();
        assert_eq!(tags, vec!["p1-m1-tag"]);
        assert_eq!((from, to), (task.from_time(), task.to_time()));
        assert_eq!(serving.calls()[0].2, "r1");
    }

    #[tokio::test]
    async fn test_too_few_rows_is_data_unavailable() {
        let model_info = Arc::new(MockModelInfoProvider::with_models(vec![descriptor("p1", "m1")]));
        let sensor_data = Arc::new(MockSensorDataProvider::new());
        sensor_data.set_rows(2);
        let serving = MockModelServingClient::default();
        let predictor =
            SensorBackedPredictor::new(model_info, sensor_data, pool_with(serving.clone()), 3);

        let err = predictor
            .execute_prediction(&TaskBuilder::new().build(), "r1", &default_training_period())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), TaskErrorKind::DataUnavailable);
        assert!(serving.calls().is_empty());
    }

    #[test]
    fn test_client_pool_creates_each_project_once() {
        let created = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&created);
        let pool = ClientPool::new(Arc::new(
            move |_project: &str| -> SchedulerResult<Arc<dyn ModelServingClient>> {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(MockModelServingClient::default()))
            },
        ));

        pool.warm_up(&["p1".to_string(), "p2".to_string()]).unwrap();
        pool.get("p1").unwrap();
        pool.get("p3").unwrap();

        assert_eq!(pool.len(), 3);
        assert_eq!(created.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_client_pool_factory_failure_is_unknown_error() {
        let pool = ClientPool::new(Arc::new(
            |project: &str| -> SchedulerResult<Arc<dyn ModelServingClient>> {
                Err(SchedulerError::config_error(format!("bad endpoint for {project}")))
            },
        ));

        let err = pool.get("p1").err().unwrap();
        assert_eq!(err.kind(), TaskErrorKind::Unknown);
        assert!(pool.is_empty());
    }
}

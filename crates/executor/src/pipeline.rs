use std::sync::Arc;

use prediction_core::TaskError;
use prediction_domain::entities::Task;
use prediction_domain::ports::{
    MetadataStorage, ModelInfoProvider, PredictionStorage, Predictor, SensorDataProvider,
};
use tracing::debug;

/// 单个任务的处理阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStage {
    Received,
    SpecResolved,
    Predicted,
    Stored,
    Done,
}

/// 成功处理一个任务后的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    pub revision: String,
    pub output_count: usize,
}

/// 预测流水线：解析模型版本 → 预测 → 存储预测值和元数据
pub struct PredictionPipeline {
    model_info: Arc<dyn ModelInfoProvider>,
    predictor: Arc<dyn Predictor>,
    sensor_data: Arc<dyn SensorDataProvider>,
    prediction_storage: Arc<dyn PredictionStorage>,
    metadata_storage: Arc<dyn MetadataStorage>,
}

impl PredictionPipeline {
    pub fn new(
        model_info: Arc<dyn ModelInfoProvider>,
        predictor: Arc<dyn Predictor>,
        sensor_data: Arc<dyn SensorDataProvider>,
        prediction_storage: Arc<dyn PredictionStorage>,
        metadata_storage: Arc<dyn MetadataStorage>,
    ) -> Self {
        Self {
            model_info,
            predictor,
            sensor_data,
            prediction_storage,
            metadata_storage,
        }
    }

    pub async fn process(&self, task: &Task) -> Result<PipelineReport, TaskError> {
        let project_name = task.project_name();
        let model_name = task.model_name();
        trace_stage(task, TaskStage::Received);

        let revision = self
            .model_info
            .get_project_latest_revision(project_name)
            .await?;
        let training_period = self
            .model_info
            .get_model_training_dates(project_name, model_name, &revision)
            .await?;
        trace_stage(task, TaskStage::SpecResolved);

        let result = self
            .predictor
            .execute_prediction(task, &revision, &training_period)
            .await?;
        trace_stage(task, TaskStage::Predicted);

        // 输入标签必须全部解析为时序ID后才写入任何数据
        let input_tags = &result.metadata.input_tags;
        let input_time_series_ids = self.sensor_data.get_time_series_ids(input_tags).await?;
        let missing: Vec<String> = input_tags
            .iter()
            .filter(|tag| !input_time_series_ids.contains_key(*tag))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(TaskError::tag_not_found(missing));
        }

        let stored = self.prediction_storage.put_prediction(&result).await?;
        self.metadata_storage
            .put_prediction_metadata(
                &result,
                &stored.output_tag_names,
                &stored.output_time_series_ids,
                &input_time_series_ids,
            )
            .await?;
        trace_stage(task, TaskStage::Stored);

        trace_stage(task, TaskStage::Done);
        Ok(PipelineReport {
            revision,
            output_count: result.series.len(),
        })
    }
}

fn trace_stage(task: &Task, stage: TaskStage) {
    debug!(
        task.project = task.project_name(),
        task.model = task.model_name(),
        task.stage = ?stage,
        "任务进入阶段"
    );
}

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::model::ModelTrainingPeriod;

/// 传感器数据集：按标签分列，时间戳为行索引
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SensorDataSet {
    pub tags: Vec<String>,
    pub index: Vec<DateTime<Utc>>,
    /// 行优先，每行的长度等于 `tags.len()`
    pub values: Vec<Vec<f64>>,
}

impl SensorDataSet {
    pub fn row_count(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// 检查行数与列数是否一致
    pub fn is_well_formed(&self) -> bool {
        self.index.len() == self.values.len()
            && self.values.iter().all(|row| row.len() == self.tags.len())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// 一条命名的预测输出序列
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSeries {
    pub name: String,
    pub points: Vec<DataPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionMetadata {
    pub project_name: String,
    pub model_name: String,
    pub revision: String,
    pub training_period: ModelTrainingPeriod,
    /// 模型输入标签，存储元数据时需要解析为时序ID
    pub input_tags: Vec<String>,
}

/// 预测结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub metadata: PredictionMetadata,
    pub from_time: DateTime<Utc>,
    pub to_time: DateTime<Utc>,
    pub series: Vec<OutputSeries>,
}

impl PredictionResult {
    /// 输出标签名，由项目、模型和序列名确定，重复处理同一任务时保持不变
    pub fn output_tag_name(&self, series_name: &str) -> String {
        format!(
            "{}.{}.{}",
            self.metadata.project_name, self.metadata.model_name, series_name
        )
    }

    /// 序列名到输出标签名的映射
    pub fn output_tag_names(&self) -> BTreeMap<String, String> {
        self.series
            .iter()
            .map(|s| (s.name.clone(), self.output_tag_name(&s.name)))
            .collect()
    }
}

/// 预测值写入后的结果
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StoredPrediction {
    /// 序列名 -> 输出标签名
    pub output_tag_names: BTreeMap<String, String>,
    /// 输出标签名 -> 时序ID
    pub output_time_series_ids: BTreeMap<String, String>,
}

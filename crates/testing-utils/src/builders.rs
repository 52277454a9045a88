//! Test data builders with sensible defaults

use chrono::{DateTime, Duration, TimeZone, Utc};
use prediction_domain::entities::{
    DataPoint, ModelDescriptor, ModelTrainingPeriod, OutputSeries, PredictionMetadata,
    PredictionResult, Task,
};

pub fn default_from_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

pub fn default_training_period() -> ModelTrainingPeriod {
    ModelTrainingPeriod {
        train_start_date: Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap(),
        train_end_date: Utc.with_ymd_and_hms(2023, 12, 1, 0, 0, 0).unwrap(),
    }
}

/// Builder for Task values
pub struct TaskBuilder {
    project_name: String,
    model_name: String,
    from_time: DateTime<Utc>,
    to_time: DateTime<Utc>,
}

impl TaskBuilder {
    pub fn new() -> Self {
        let from_time = default_from_time();
        Self {
            project_name: "p1".to_string(),
            model_name: "m1".to_string(),
            from_time,
            to_time: from_time + Duration::minutes(30),
        }
    }

    pub fn with_project(mut self, project_name: &str) -> Self {
        self.project_name = project_name.to_string();
        self
    }

    pub fn with_model(mut self, model_name: &str) -> Self {
        self.model_name = model_name.to_string();
        self
    }

    pub fn with_window(mut self, from_time: DateTime<Utc>, to_time: DateTime<Utc>) -> Self {
        self.from_time = from_time;
        self.to_time = to_time;
        self
    }

    pub fn build(self) -> Task {
        Task::new(
            self.project_name,
            self.model_name,
            self.from_time,
            self.to_time,
        )
        .unwrap()
    }
}

impl Default for TaskBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Descriptor with both names set and a single input tag
pub fn descriptor(project_name: &str, model_name: &str) -> ModelDescriptor {
    ModelDescriptor {
        project_name: Some(project_name.to_string()),
        model_name: Some(model_name.to_string()),
        tag_list: vec![format!("{project_name}-{model_name}-tag")],
        target_tag_list: None,
    }
}

/// Builder for PredictionResult values
pub struct PredictionResultBuilder {
    task: Task,
    revision: String,
    training_period: ModelTrainingPeriod,
    input_tags: Vec<String>,
    series_names: Vec<String>,
    points_per_series: usize,
}

impl PredictionResultBuilder {
    pub fn for_task(task: &Task) -> Self {
        Self {
            task: task.clone(),
            revision: "r1".to_string(),
            training_period: default_training_period(),
            input_tags: vec!["tag-a".to_string(), "tag-b".to_string()],
            series_names: vec!["anomaly-score".to_string(), "total-anomaly".to_string()],
            points_per_series: 3,
        }
    }

    pub fn with_revision(mut self, revision: &str) -> Self {
        self.revision = revision.to_string();
        self
    }

    pub fn with_training_period(mut self, training_period: ModelTrainingPeriod) -> Self {
        self.training_period = training_period;
        self
    }

    pub fn with_input_tags(mut self, tags: Vec<String>) -> Self {
        self.input_tags = tags;
        self
    }

    pub fn with_series(mut self, names: Vec<String>) -> Self {
        self.series_names = names;
        self
    }

    pub fn with_points_per_series(mut self, points: usize) -> Self {
        self.points_per_series = points;
        self
    }

    pub fn build(self) -> PredictionResult {
        let step = Duration::minutes(10);
        let series = self
            .series_names
            .iter()
            .enumerate()
            .map(|(offset, name)| OutputSeries {
                name: name.clone(),
                points: (0..self.points_per_series)
                    .map(|i| DataPoint {
                        timestamp: self.task.from_time() + step * i as i32,
                        value: (offset * 100 + i) as f64,
                    })
                    .collect(),
            })
            .collect();

        PredictionResult {
            metadata: PredictionMetadata {
                project_name: self.task.project_name().to_string(),
                model_name: self.task.model_name().to_string(),
                revision: self.revision,
                training_period: self.training_period,
                input_tags: self.input_tags,
            },
            from_time: self.task.from_time(),
            to_time: self.task.to_time(),
            series,
        }
    }
}

use chrono::{DateTime, Utc};
use prediction_core::{SchedulerError, SchedulerResult};
use serde::{Deserialize, Serialize};

/// 预测任务
///
/// 标识一个模型在一个时间窗口上的一次预测，创建后不可变。
/// 时间戳为 UTC，序列化为带纳秒精度的 RFC 3339 字符串。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "TaskFields")]
pub struct Task {
    project_name: String,
    model_name: String,
    from_time: DateTime<Utc>,
    to_time: DateTime<Utc>,
}

#[derive(Deserialize)]
struct TaskFields {
    project_name: String,
    model_name: String,
    from_time: DateTime<Utc>,
    to_time: DateTime<Utc>,
}

impl TryFrom<TaskFields> for Task {
    type Error = SchedulerError;

    fn try_from(fields: TaskFields) -> SchedulerResult<Self> {
        Task::new(
            fields.project_name,
            fields.model_name,
            fields.from_time,
            fields.to_time,
        )
    }
}

impl Task {
    pub fn new<P: Into<String>, M: Into<String>>(
        project_name: P,
        model_name: M,
        from_time: DateTime<Utc>,
        to_time: DateTime<Utc>,
    ) -> SchedulerResult<Self> {
        if from_time > to_time {
            return Err(SchedulerError::invalid_params(format!(
                "任务开始时间 {from_time} 晚于结束时间 {to_time}"
            )));
        }

        Ok(Self {
            project_name: project_name.into(),
            model_name: model_name.into(),
            from_time,
            to_time,
        })
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn from_time(&self) -> DateTime<Utc> {
        self.from_time
    }

    pub fn to_time(&self) -> DateTime<Utc> {
        self.to_time
    }
}

impl std::fmt::Display for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{} [{} - {}]",
            self.project_name,
            self.model_name,
            self.from_time.to_rfc3339(),
            self.to_time.to_rfc3339()
        )
    }
}

use prediction_core::QueueError;
use prediction_domain::entities::{Task, TaskMessage, TASK_SCHEMA_VERSION};

/// 任务消息编解码
///
/// 所有队列后端共享同一种 JSON 信封格式。
pub struct TaskCodec;

impl TaskCodec {
    /// 为任务生成新的消息信封并编码
    pub fn encode_task(task: &Task) -> Result<(TaskMessage, Vec<u8>), QueueError> {
        let message = TaskMessage::new(task.clone());
        let payload = Self::encode(&message)?;
        Ok((message, payload))
    }

    pub fn encode(message: &TaskMessage) -> Result<Vec<u8>, QueueError> {
        serde_json::to_vec(message)
            .map_err(|e| QueueError::serialization(format!("序列化任务消息 {} 失败: {e}", message.id)))
    }

    pub fn decode(payload: &[u8]) -> Result<TaskMessage, QueueError> {
        let message: TaskMessage = serde_json::from_slice(payload)
            .map_err(|e| QueueError::serialization(format!("反序列化任务消息失败: {e}")))?;

        if message.schema_version == 0 || message.schema_version > TASK_SCHEMA_VERSION {
            return Err(QueueError::serialization(format!(
                "不支持的任务消息版本: {} (当前版本 {})",
                message.schema_version, TASK_SCHEMA_VERSION
            )));
        }

        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn sample_task() -> Task {
        let from = Utc.timestamp_opt(1_704_067_200, 987_654_321).unwrap();
        Task::new("p1", "m1", from, from + Duration::minutes(30)).unwrap()
    }

    #[test]
    fn test_encode_decode_preserves_task() {
        let (message, payload) = TaskCodec::encode_task(&sample_task()).unwrap();
        let decoded = TaskCodec::decode(&payload).unwrap();
        assert_eq!(decoded, message);
        assert_eq!(decoded.task, sample_task());
    }

    #[test]
    fn test_empty_names_survive_encoding() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let task = Task::new("", "", at, at).unwrap();
        let (_, payload) = TaskCodec::encode_task(&task).unwrap();
        assert_eq!(TaskCodec::decode(&payload).unwrap().task, task);
    }

    #[test]
    fn test_boundary_timestamps_survive_encoding() {
        let year_10000 = Utc.with_ymd_and_hms(10000, 1, 1, 0, 0, 0).unwrap();
        let windows = [
            (DateTime::<Utc>::MIN_UTC, DateTime::<Utc>::MIN_UTC),
            (DateTime::<Utc>::MIN_UTC, DateTime::<Utc>::MAX_UTC),
            (DateTime::<Utc>::MAX_UTC, DateTime::<Utc>::MAX_UTC),
            (Utc.timestamp_opt(0, 0).unwrap(), year_10000),
            (year_10000, year_10000 + Duration::nanoseconds(1)),
        ];

        for (from, to) in windows {
            let task = Task::new("", "m1", from, to).unwrap();
            let (_, payload) = TaskCodec::encode_task(&task).unwrap();
            let decoded = TaskCodec::decode(&payload).unwrap().task;
            assert_eq!(decoded, task, "window [{from}, {to}]");
            assert_eq!(decoded.from_time(), from);
            assert_eq!(decoded.to_time(), to);
        }
    }

    #[test]
    fn test_payload_is_self_describing_json() {
        let (_, payload) = TaskCodec::encode_task(&sample_task()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(value["schema_version"], 1);
        assert_eq!(value["task"]["project_name"], "p1");
        assert_eq!(value["task"]["from_time"], "2024-01-01T00:00:00.987654321Z");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = TaskCodec::decode(b"not json").unwrap_err();
        assert!(matches!(err, QueueError::SerializationFailed(_)));
    }

    #[test]
    fn test_decode_rejects_future_schema_version() {
        let (mut message, _) = TaskCodec::encode_task(&sample_task()).unwrap();
        message.schema_version = TASK_SCHEMA_VERSION + 1;
        let payload = serde_json::to_vec(&message).unwrap();
        assert!(TaskCodec::decode(&payload).is_err());
    }

    #[test]
    fn test_decode_rejects_inverted_window() {
        let payload = br#"{
            "id": "x",
            "schema_version": 1,
            "task": {
                "project_name": "p1",
                "model_name": "m1",
                "from_time": "2024-01-02T00:00:00Z",
                "to_time": "2024-01-01T00:00:00Z"
            },
            "enqueued_at": "2024-01-01T00:00:00Z"
        }"#;
        assert!(TaskCodec::decode(payload).is_err());
    }
}

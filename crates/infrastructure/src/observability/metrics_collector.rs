//! 调度与执行指标
//!
//! 未安装全局记录器时所有操作都是空操作，测试中可以直接使用。

use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};
use prediction_core::TaskErrorKind;

pub struct MetricsCollector {
    // 调度端
    tasks_dispatched_total: Counter,
    dispatch_failures_total: Counter,
    malformed_descriptors_total: Counter,
    dispatch_duration: Histogram,
    catalog_syncs_total: Counter,
    catalog_sync_failures_total: Counter,
    catalog_models: Gauge,

    // 执行端
    tasks_completed_total: Counter,
    task_processing_duration: Histogram,
    idle_polls_total: Counter,
    queue_errors_total: Counter,
    queue_operation_duration: Histogram,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            tasks_dispatched_total: counter!("prediction_tasks_dispatched_total"),
            dispatch_failures_total: counter!("prediction_dispatch_failures_total"),
            malformed_descriptors_total: counter!("prediction_malformed_descriptors_total"),
            dispatch_duration: histogram!("prediction_dispatch_duration_seconds"),
            catalog_syncs_total: counter!("prediction_catalog_syncs_total"),
            catalog_sync_failures_total: counter!("prediction_catalog_sync_failures_total"),
            catalog_models: gauge!("prediction_catalog_models"),
            tasks_completed_total: counter!("prediction_tasks_completed_total"),
            task_processing_duration: histogram!("prediction_task_processing_duration_seconds"),
            idle_polls_total: counter!("prediction_idle_polls_total"),
            queue_errors_total: counter!("prediction_queue_errors_total"),
            queue_operation_duration: histogram!(
                "prediction_queue_operation_duration_seconds"
            ),
        }
    }

    pub fn record_task_dispatched(&self) {
        self.tasks_dispatched_total.increment(1);
    }

    pub fn record_dispatch_failure(&self) {
        self.dispatch_failures_total.increment(1);
    }

    pub fn record_malformed_descriptor(&self) {
        self.malformed_descriptors_total.increment(1);
    }

    pub fn record_dispatch_duration(&self, duration_seconds: f64) {
        self.dispatch_duration.record(duration_seconds);
    }

    pub fn record_catalog_sync(&self, model_count: usize) {
        self.catalog_syncs_total.increment(1);
        self.catalog_models.set(model_count as f64);
    }

    pub fn record_catalog_sync_failure(&self) {
        self.catalog_sync_failures_total.increment(1);
    }

    pub fn record_task_completed(&self, duration_seconds: f64) {
        self.tasks_completed_total.increment(1);
        self.task_processing_duration.record(duration_seconds);
    }

    /// 按错误种类统计放弃的任务
    pub fn record_task_abandoned(&self, kind: TaskErrorKind, duration_seconds: f64) {
        counter!("prediction_tasks_abandoned_total", "kind" => kind.as_str()).increment(1);
        self.task_processing_duration.record(duration_seconds);
    }

    pub fn record_idle_poll(&self) {
        self.idle_polls_total.increment(1);
    }

    pub fn record_queue_error(&self) {
        self.queue_errors_total.increment(1);
    }

    pub fn record_queue_operation(&self, duration_seconds: f64) {
        self.queue_operation_duration.record(duration_seconds);
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        let metrics = MetricsCollector::new();
        metrics.record_task_dispatched();
        metrics.record_catalog_sync(3);
        metrics.record_task_abandoned(TaskErrorKind::TagNotFound, 0.25);
        metrics.record_queue_operation(0.01);
    }
}

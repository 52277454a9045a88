use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use prediction_core::{Clock, SchedulerConfig, SchedulerError, SchedulerResult, TaskError};
use prediction_domain::entities::Task;
use prediction_domain::ports::{ModelInfoProvider, TaskSender};
use prediction_infrastructure::{MetricsCollector, StructuredLogger};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::catalog::ModelCatalog;
use crate::timer::Timer;

const UNKNOWN_NAME: &str = "<unknown>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Running,
}

/// 成功与失败计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchCount {
    pub succeeded: usize,
    pub failed: usize,
}

/// 一轮派发的统计结果
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchSummary {
    pub from_time: DateTime<Utc>,
    pub to_time: DateTime<Utc>,
    pub per_project: BTreeMap<String, DispatchCount>,
    pub per_model: BTreeMap<(String, String), DispatchCount>,
}

impl DispatchSummary {
    fn new(from_time: DateTime<Utc>, to_time: DateTime<Utc>) -> Self {
        Self {
            from_time,
            to_time,
            per_project: BTreeMap::new(),
            per_model: BTreeMap::new(),
        }
    }

    fn record(&mut self, project_name: &str, model_name: &str, succeeded: bool) {
        let project = self.per_project.entry(project_name.to_string()).or_default();
        let model = self
            .per_model
            .entry((project_name.to_string(), model_name.to_string()))
            .or_default();
        if succeeded {
            project.succeeded += 1;
            model.succeeded += 1;
        } else {
            project.failed += 1;
            model.failed += 1;
        }
    }

    pub fn succeeded(&self) -> usize {
        self.per_project.values().map(|c| c.succeeded).sum()
    }

    pub fn failed(&self) -> usize {
        self.per_project.values().map(|c| c.failed).sum()
    }

    fn log(&self) {
        StructuredLogger::log_dispatch_summary(
            self.from_time,
            self.to_time,
            self.succeeded(),
            self.failed(),
            &self.to_string(),
        );
    }
}

impl fmt::Display for DispatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (project, count) in &self.per_project {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(f, "{project}: {} ok / {} failed", count.succeeded, count.failed)?;
        }
        Ok(())
    }
}

/// 预测调度器
///
/// 单个控制循环，按固定粒度轮询两个计时器：配置同步和预测派发。
pub struct PredictionScheduler {
    catalog: ModelCatalog,
    sender: Arc<dyn TaskSender>,
    clock: Arc<dyn Clock>,
    metrics: Arc<MetricsCollector>,
    prediction_interval: chrono::Duration,
    poll_interval: Duration,
    sync_timer: Timer,
    dispatch_timer: Timer,
    state: SchedulerState,
}

impl PredictionScheduler {
    pub fn new(
        config: &SchedulerConfig,
        model_info: Arc<dyn ModelInfoProvider>,
        sender: Arc<dyn TaskSender>,
        clock: Arc<dyn Clock>,
        metrics: Arc<MetricsCollector>,
    ) -> SchedulerResult<Self> {
        let prediction_interval = chrono::Duration::from_std(config.continuous_prediction_interval())
            .map_err(|e| SchedulerError::config_error(format!("预测间隔超出范围: {e}")))?;

        Ok(Self {
            catalog: ModelCatalog::new(model_info, config.projects.clone()),
            sender,
            metrics,
            prediction_interval,
            poll_interval: config.poll_interval(),
            sync_timer: Timer::new(config.configuration_sync_interval(), Arc::clone(&clock)),
            dispatch_timer: Timer::new(config.continuous_prediction_interval(), Arc::clone(&clock)),
            clock,
            state: SchedulerState::Stopped,
        })
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// 刷新模型目录，失败时保留旧目录
    pub async fn synchronize_configuration(&self) -> Result<usize, TaskError> {
        match self.catalog.synchronize().await {
            Ok(count) => {
                self.metrics.record_catalog_sync(count);
                StructuredLogger::log_catalog_synced(count, self.catalog.projects());
                Ok(count)
            }
            Err(e) => {
                self.metrics.record_catalog_sync_failure();
                StructuredLogger::log_catalog_sync_failed(&e, self.catalog.len());
                Err(e)
            }
        }
    }

    /// 为目录中的每个模型派发一个预测任务
    ///
    /// 所有任务使用同一个时间窗口。缺少项目名或模型名的描述记为失败并跳过；
    /// 队列写入失败立即中止本轮并返回错误。
    pub async fn perform_prediction_step(&self) -> SchedulerResult<DispatchSummary> {
        let started = Instant::now();
        let from_time = self.clock.now();
        let to_time = from_time
            .checked_add_signed(self.prediction_interval)
            .ok_or_else(|| {
                SchedulerError::config_error(format!(
                    "预测窗口结束时间超出范围: {} + {}",
                    from_time, self.prediction_interval
                ))
            })?;
        let mut summary = DispatchSummary::new(from_time, to_time);

        let snapshot = self.catalog.snapshot();
        info!("开始派发预测任务: {} 个模型, 窗口 [{}, {}]", snapshot.len(), from_time, to_time);

        for descriptor in snapshot.iter() {
            let Some((project_name, model_name)) = descriptor.identity() else {
                StructuredLogger::log_malformed_descriptor(
                    descriptor.project_name.as_deref(),
                    descriptor.model_name.as_deref(),
                );
                self.metrics.record_malformed_descriptor();
                summary.record(
                    non_blank(descriptor.project_name.as_deref()),
                    non_blank(descriptor.model_name.as_deref()),
                    false,
                );
                continue;
            };

            let task = Task::new(project_name, model_name, from_time, to_time)?;
            if let Err(e) = self.sender.put_task(&task).await {
                self.metrics.record_dispatch_failure();
                summary.record(project_name, model_name, false);
                summary.log();
                error!(
                    task.project = project_name,
                    task.model = model_name,
                    "任务写入队列失败，中止本轮派发: {}",
                    e
                );
                return Err(e.into());
            }

            self.metrics.record_task_dispatched();
            StructuredLogger::log_task_dispatched(&task);
            summary.record(project_name, model_name, true);
        }

        self.metrics
            .record_dispatch_duration(started.elapsed().as_secs_f64());
        summary.log();
        Ok(summary)
    }

    /// 运行控制循环直到收到关闭信号
    ///
    /// 同步失败只记录日志；派发失败结束循环并返回错误。
    pub async fn run(&mut self, mut shutdown_rx: broadcast::Receiver<()>) -> SchedulerResult<()> {
        self.state = SchedulerState::Running;
        info!(
            "预测调度器已启动: 同步间隔 {:?}, 预测间隔 {:?}, 轮询间隔 {:?}",
            self.sync_timer.trigger_interval(),
            self.dispatch_timer.trigger_interval(),
            self.poll_interval
        );

        let result = loop {
            if self.sync_timer.is_triggered() {
                self.sync_timer.start();
                // 失败已在内部记录
                let _ = self.synchronize_configuration().await;
            }

            if self.dispatch_timer.is_triggered() {
                self.dispatch_timer.start();
                if let Err(e) = self.perform_prediction_step().await {
                    error!("预测派发失败，调度器退出: {}", e);
                    break Err(e);
                }
            }

            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    info!("调度器循环收到关闭信号");
                    break Ok(());
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        };

        if let Err(e) = self.sender.close().await {
            warn!("关闭任务发送端失败: {}", e);
        }
        self.state = SchedulerState::Stopped;
        info!("预测调度器已停止");
        result
    }
}

fn non_blank(name: Option<&str>) -> &str {
    name.filter(|n| !n.trim().is_empty()).unwrap_or(UNKNOWN_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_summary_counts_per_project_and_model() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut summary = DispatchSummary::new(at, at);
        summary.record("p1", "m1", true);
        summary.record("p1", "m2", false);
        summary.record("p2", "m1", true);

        assert_eq!(summary.succeeded(), 2);
        assert_eq!(summary.failed(), 1);
        assert_eq!(
            summary.per_project["p1"],
            DispatchCount {
                succeeded: 1,
                failed: 1
            }
        );
        assert_eq!(
            summary.per_model[&("p1".to_string(), "m2".to_string())].failed,
            1
        );
        assert_eq!(
            summary.to_string(),
            "p1: 1 ok / 1 failed, p2: 1 ok / 0 failed"
        );
    }

    #[test]
    fn test_non_blank_falls_back_to_unknown() {
        assert_eq!(non_blank(Some("p1")), "p1");
        assert_eq!(non_blank(Some("  ")), UNKNOWN_NAME);
        assert_eq!(non_blank(None), UNKNOWN_NAME);
    }
}

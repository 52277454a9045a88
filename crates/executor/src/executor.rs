use std::sync::Arc;
use std::time::{Duration, Instant};

use prediction_core::{ExecutorConfig, QueueError, SchedulerResult, TaskErrorKind};
use prediction_domain::entities::ReceivedTask;
use prediction_domain::ports::TaskReceiver;
use prediction_infrastructure::{MetricsCollector, StructuredLogger};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::pipeline::PredictionPipeline;

/// 一次 `process_one_task` 的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// 队列中没有任务
    Idle,
    Completed { message_id: String, revision: String },
    Abandoned { message_id: String, kind: TaskErrorKind },
}

/// 执行器构建器
pub struct ExecutorBuilder {
    receiver: Arc<dyn TaskReceiver>,
    pipeline: Arc<PredictionPipeline>,
    executor_id: String,
    poll_timeout: Duration,
    max_consecutive_queue_failures: u32,
    metrics: Arc<MetricsCollector>,
}

impl ExecutorBuilder {
    pub fn new(receiver: Arc<dyn TaskReceiver>, pipeline: Arc<PredictionPipeline>) -> Self {
        Self {
            receiver,
            pipeline,
            executor_id: hostname::get()
                .unwrap_or_else(|_| "unknown".into())
                .to_string_lossy()
                .to_string(),
            poll_timeout: Duration::from_secs(1),
            max_consecutive_queue_failures: 5,
            metrics: Arc::new(MetricsCollector::new()),
        }
    }

    /// 从执行器配置读取轮询超时和失败阈值
    pub fn config(self, config: &ExecutorConfig) -> Self {
        self.poll_timeout(config.poll_timeout())
            .max_consecutive_queue_failures(config.max_consecutive_queue_failures)
    }

    pub fn executor_id<S: Into<String>>(mut self, executor_id: S) -> Self {
        self.executor_id = executor_id.into();
        self
    }

    pub fn poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    pub fn max_consecutive_queue_failures(mut self, max: u32) -> Self {
        self.max_consecutive_queue_failures = max.max(1);
        self
    }

    pub fn metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn build(self) -> Executor {
        Executor {
            receiver: self.receiver,
            pipeline: self.pipeline,
            executor_id: self.executor_id,
            poll_timeout: self.poll_timeout,
            max_consecutive_queue_failures: self.max_consecutive_queue_failures,
            metrics: self.metrics,
        }
    }
}

/// 预测任务执行器
///
/// 从队列逐个取任务并交给流水线处理。单个任务的失败按种类记录后确认，
/// 不影响后续任务；连续的队列错误超过阈值时退出。
pub struct Executor {
    receiver: Arc<dyn TaskReceiver>,
    pipeline: Arc<PredictionPipeline>,
    executor_id: String,
    poll_timeout: Duration,
    max_consecutive_queue_failures: u32,
    metrics: Arc<MetricsCollector>,
}

impl Executor {
    pub fn builder(
        receiver: Arc<dyn TaskReceiver>,
        pipeline: Arc<PredictionPipeline>,
    ) -> ExecutorBuilder {
        ExecutorBuilder::new(receiver, pipeline)
    }

    pub fn executor_id(&self) -> &str {
        &self.executor_id
    }

    /// 取一个任务并处理完毕
    pub async fn process_one_task(&self) -> Result<TaskOutcome, QueueError> {
        let received = self.receive().await?;
        self.handle(received).await
    }

    async fn receive(&self) -> Result<Option<ReceivedTask>, QueueError> {
        let started = Instant::now();
        let received = self.receiver.get_task(self.poll_timeout).await;
        self.metrics
            .record_queue_operation(started.elapsed().as_secs_f64());
        received
    }

    async fn handle(&self, received: Option<ReceivedTask>) -> Result<TaskOutcome, QueueError> {
        let Some(received) = received else {
            debug!("执行器 {} 没有取到任务", self.executor_id);
            self.metrics.record_idle_poll();
            return Ok(TaskOutcome::Idle);
        };

        let task = &received.task;
        StructuredLogger::log_task_received(task, &received.message_id, &self.executor_id);

        let started = Instant::now();
        let outcome = match self.pipeline.process(task).await {
            Ok(report) => {
                let elapsed = started.elapsed();
                StructuredLogger::log_task_completed(
                    task,
                    &report.revision,
                    report.output_count,
                    elapsed.as_millis() as u64,
                );
                self.metrics.record_task_completed(elapsed.as_secs_f64());
                TaskOutcome::Completed {
                    message_id: received.message_id.clone(),
                    revision: report.revision,
                }
            }
            Err(e) => {
                StructuredLogger::log_task_abandoned(task, &e);
                self.metrics
                    .record_task_abandoned(e.kind(), started.elapsed().as_secs_f64());
                TaskOutcome::Abandoned {
                    message_id: received.message_id.clone(),
                    kind: e.kind(),
                }
            }
        };

        self.receiver.ack(&received).await?;
        Ok(outcome)
    }

    /// 运行执行循环直到收到关闭信号
    ///
    /// 关闭信号只在等待任务时生效，正在处理的任务会先完成。
    /// 退出时总是关闭接收端。
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> SchedulerResult<()> {
        info!("执行器 {} 已启动", self.executor_id);
        let mut consecutive_failures: u32 = 0;

        let result = loop {
            let received = tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    info!("执行器 {} 收到关闭信号", self.executor_id);
                    break Ok(());
                }
                received = self.receive() => received,
            };

            let outcome = match received {
                Ok(received) => self.handle(received).await,
                Err(e) => Err(e),
            };

            match outcome {
                Ok(_) => consecutive_failures = 0,
                Err(e) => {
                    consecutive_failures += 1;
                    self.metrics.record_queue_error();
                    if consecutive_failures >= self.max_consecutive_queue_failures {
                        error!(
                            "执行器 {} 连续 {} 次队列错误，退出: {}",
                            self.executor_id, consecutive_failures, e
                        );
                        break Err(e.into());
                    }
                    warn!(
                        "执行器 {} 队列错误 ({}/{}): {}",
                        self.executor_id,
                        consecutive_failures,
                        self.max_consecutive_queue_failures,
                        e
                    );

                    tokio::select! {
                        _ = shutdown_rx.recv() => {
                            info!("执行器 {} 收到关闭信号", self.executor_id);
                            break Ok(());
                        }
                        _ = tokio::time::sleep(self.poll_timeout) => {}
                    }
                }
            }
        };

        if let Err(e) = self.receiver.close().await {
            warn!("关闭执行器 {} 的接收端失败: {}", self.executor_id, e);
        }
        info!("执行器 {} 已停止", self.executor_id);
        result
    }
}

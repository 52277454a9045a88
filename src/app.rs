use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use prediction_core::{AppConfig, SchedulerResult, SystemClock};
use prediction_dispatcher::PredictionScheduler;
use prediction_domain::ports::{
    MetadataStorage, ModelInfoProvider, ModelServingClient, PredictionStorage, SensorDataProvider,
};
use prediction_executor::{
    ClientPool, Executor, PredictionPipeline, SensorBackedPredictor, ServingClientFactory,
};
use prediction_infrastructure::{
    mask_url, HttpMetadataStorage, HttpModelInfoProvider, HttpModelServingClient,
    HttpPredictionStorage, HttpSensorDataProvider, MetricsCollector, TaskQueueFactory,
};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// 应用运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    /// 仅运行调度器
    Scheduler,
    /// 仅运行执行器
    Executor,
    /// 同一进程内运行调度器和所有执行器
    All,
}

impl AppMode {
    fn runs_scheduler(self) -> bool {
        matches!(self, AppMode::Scheduler | AppMode::All)
    }

    fn runs_executors(self) -> bool {
        matches!(self, AppMode::Executor | AppMode::All)
    }
}

impl FromStr for AppMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "scheduler" => Ok(AppMode::Scheduler),
            "executor" => Ok(AppMode::Executor),
            "all" => Ok(AppMode::All),
            _ => Err(anyhow::anyhow!("不支持的运行模式: {s}")),
        }
    }
}

/// 调度器和执行器依赖的外部服务
#[derive(Clone)]
pub struct Collaborators {
    pub model_info: Arc<dyn ModelInfoProvider>,
    pub sensor_data: Arc<dyn SensorDataProvider>,
    pub prediction_storage: Arc<dyn PredictionStorage>,
    pub metadata_storage: Arc<dyn MetadataStorage>,
    pub serving_clients: ServingClientFactory,
}

impl Collaborators {
    /// 按配置创建 HTTP 适配器
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let model_info =
            HttpModelInfoProvider::new(&config.model_info).context("创建模型信息客户端失败")?;
        let sensor_data =
            HttpSensorDataProvider::new(&config.sensor_data).context("创建传感器数据客户端失败")?;
        let prediction_storage = HttpPredictionStorage::new(&config.prediction_storage)
            .context("创建预测存储客户端失败")?;
        let metadata_storage = HttpMetadataStorage::new(&config.metadata_storage)
            .context("创建元数据存储客户端失败")?;

        let serving_endpoint = config.model_serving.clone();
        let serving_clients: ServingClientFactory = Arc::new(
            move |project: &str| -> SchedulerResult<Arc<dyn ModelServingClient>> {
                Ok(Arc::new(HttpModelServingClient::new(project, &serving_endpoint)?))
            },
        );

        info!(
            "外部服务: model_info={}, sensor_data={}, model_serving={}",
            mask_url(&config.model_info.base_url),
            mask_url(&config.sensor_data.base_url),
            mask_url(&config.model_serving.base_url)
        );

        Ok(Self {
            model_info: Arc::new(model_info),
            sensor_data: Arc::new(sensor_data),
            prediction_storage: Arc::new(prediction_storage),
            metadata_storage: Arc::new(metadata_storage),
            serving_clients,
        })
    }
}

/// 主应用程序
pub struct Application {
    config: AppConfig,
    mode: AppMode,
    collaborators: Collaborators,
    queue_factory: TaskQueueFactory,
    metrics: Arc<MetricsCollector>,
}

impl Application {
    pub fn new(config: AppConfig, mode: AppMode) -> Result<Self> {
        let collaborators = Collaborators::from_config(&config)?;
        Self::with_collaborators(config, mode, collaborators)
    }

    pub fn with_collaborators(
        config: AppConfig,
        mode: AppMode,
        collaborators: Collaborators,
    ) -> Result<Self> {
        info!(
            "初始化应用程序，模式: {:?}，任务队列: {}",
            mode,
            config.task_queue.backend.name()
        );
        if mode == AppMode::Scheduler && config.task_queue.backend.name() == "in_memory" {
            // 内存队列只在本进程内可见，没有执行器时任务不会被处理
            warn!("仅调度器模式使用内存队列，派发的任务不会被处理");
        }

        let queue_factory =
            TaskQueueFactory::new(config.task_queue.clone()).context("创建任务队列工厂失败")?;

        Ok(Self {
            config,
            mode,
            collaborators,
            queue_factory,
            metrics: Arc::new(MetricsCollector::new()),
        })
    }

    pub fn mode(&self) -> AppMode {
        self.mode
    }

    /// 运行组件直到收到关闭信号
    ///
    /// 任一组件异常退出时通知其他组件停止，并返回第一个错误。
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!("启动应用程序，模式: {:?}", self.mode);

        let (stop_tx, _) = broadcast::channel(1);
        let mut components = JoinSet::new();

        if self.mode.runs_scheduler() {
            let mut scheduler = self.build_scheduler().await?;
            let stop_rx = stop_tx.subscribe();
            components.spawn(async move {
                scheduler
                    .run(stop_rx)
                    .await
                    .context("预测调度器异常退出")
            });
        }

        if self.mode.runs_executors() {
            for executor in self.build_executors().await? {
                let stop_rx = stop_tx.subscribe();
                components.spawn(async move {
                    executor
                        .run(stop_rx)
                        .await
                        .with_context(|| format!("执行器 {} 异常退出", executor.executor_id()))
                });
            }
        }

        let mut first_error = None;
        let mut stopping = false;
        loop {
            tokio::select! {
                _ = shutdown_rx.recv(), if !stopping => {
                    info!("应用程序收到关闭信号");
                    stopping = true;
                    let _ = stop_tx.send(());
                }
                joined = components.join_next() => {
                    let Some(joined) = joined else { break };
                    if let Err(e) = joined.context("组件任务异常终止").and_then(|r| r) {
                        error!("{e:#}");
                        if !stopping {
                            stopping = true;
                            let _ = stop_tx.send(());
                        }
                        if first_error.is_none() {
                            first_error = Some(e);
                        }
                    }
                }
            }
        }

        info!("所有组件已停止");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn build_scheduler(&self) -> Result<PredictionScheduler> {
        let sender = self
            .queue_factory
            .create_sender()
            .await
            .context("创建任务发送端失败")?;
        let scheduler = PredictionScheduler::new(
            &self.config.scheduler,
            Arc::clone(&self.collaborators.model_info),
            sender,
            Arc::new(SystemClock),
            Arc::clone(&self.metrics),
        )
        .context("创建预测调度器失败")?;
        Ok(scheduler)
    }

    async fn build_executors(&self) -> Result<Vec<Executor>> {
        let collaborators = &self.collaborators;
        let clients = Arc::new(ClientPool::new(Arc::clone(&collaborators.serving_clients)));
        clients
            .warm_up(&self.config.scheduler.projects)
            .context("创建模型推理客户端失败")?;

        let predictor = Arc::new(SensorBackedPredictor::new(
            Arc::clone(&collaborators.model_info),
            Arc::clone(&collaborators.sensor_data),
            clients,
            self.config.executor.min_data_points,
        ));
        let pipeline = Arc::new(PredictionPipeline::new(
            Arc::clone(&collaborators.model_info),
            predictor,
            Arc::clone(&collaborators.sensor_data),
            Arc::clone(&collaborators.prediction_storage),
            Arc::clone(&collaborators.metadata_storage),
        ));

        let instance_count = self.config.executor.instance_count;
        let base_id = self.config.executor.resolved_instance_id();
        let mut executors = Vec::with_capacity(instance_count);
        for index in 0..instance_count {
            let executor_id = if instance_count == 1 {
                base_id.clone()
            } else {
                format!("{base_id}-{index}")
            };
            let receiver = self
                .queue_factory
                .create_receiver(&executor_id)
                .await
                .with_context(|| format!("创建执行器 {executor_id} 的接收端失败"))?;

            executors.push(
                Executor::builder(receiver, Arc::clone(&pipeline))
                    .config(&self.config.executor)
                    .executor_id(executor_id)
                    .metrics(Arc::clone(&self.metrics))
                    .build(),
            );
        }

        info!("已创建 {} 个执行器", executors.len());
        Ok(executors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_app_mode() {
        assert_eq!("scheduler".parse::<AppMode>().unwrap(), AppMode::Scheduler);
        assert_eq!("executor".parse::<AppMode>().unwrap(), AppMode::Executor);
        assert_eq!("all".parse::<AppMode>().unwrap(), AppMode::All);
        assert!("worker".parse::<AppMode>().is_err());
    }

    #[test]
    fn test_application_from_default_config() {
        let app = Application::new(AppConfig::default(), AppMode::All).unwrap();
        assert_eq!(app.mode(), AppMode::All);
    }

    #[test]
    fn test_invalid_endpoint_is_rejected() {
        let mut config = AppConfig::default();
        config.sensor_data.base_url = "not a url".into();
        assert!(Application::new(config, AppMode::Executor).is_err());
    }
}

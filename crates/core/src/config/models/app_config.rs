use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    endpoints_observability::{HttpEndpointConfig, ObservabilityConfig},
    scheduler_executor::{ExecutorConfig, SchedulerConfig},
    task_queue::TaskQueueConfig,
};

/// 环境变量前缀，例如 `PREDICTION_SCHEDULER__PROJECTS=p1,p2`
pub const ENV_PREFIX: &str = "PREDICTION";

/// System configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub task_queue: TaskQueueConfig,
    #[serde(default = "default_model_info")]
    pub model_info: HttpEndpointConfig,
    #[serde(default = "default_sensor_data")]
    pub sensor_data: HttpEndpointConfig,
    #[serde(default = "default_model_serving")]
    pub model_serving: HttpEndpointConfig,
    #[serde(default = "default_prediction_storage")]
    pub prediction_storage: HttpEndpointConfig,
    #[serde(default = "default_metadata_storage")]
    pub metadata_storage: HttpEndpointConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            executor: ExecutorConfig::default(),
            task_queue: TaskQueueConfig::default(),
            model_info: default_model_info(),
            sensor_data: default_sensor_data(),
            model_serving: default_model_serving(),
            prediction_storage: default_prediction_storage(),
            metadata_storage: default_metadata_storage(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from config file and environment variables
    ///
    /// Load order:
    /// 1. Default configuration
    /// 2. Config file (TOML format)
    /// 3. Environment variable overrides (prefix: PREDICTION_, nested keys separated by `__`)
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else {
            let default_paths = [
                "config/prediction.toml",
                "prediction.toml",
                "/etc/prediction/config.toml",
            ];

            if let Some(path) = default_paths.iter().find(|p| Path::new(p).exists()) {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("scheduler.projects")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    pub fn validate(&self) -> Result<()> {
        self.scheduler.validate().context("调度器配置验证失败")?;
        self.executor.validate().context("执行器配置验证失败")?;
        self.task_queue
            .validate()
            .context("任务队列配置验证失败")?;
        self.model_info
            .validate()
            .context("模型信息服务配置验证失败")?;
        self.sensor_data
            .validate()
            .context("传感器数据服务配置验证失败")?;
        self.model_serving
            .validate()
            .context("模型服务配置验证失败")?;
        self.prediction_storage
            .validate()
            .context("预测存储配置验证失败")?;
        self.metadata_storage
            .validate()
            .context("元数据存储配置验证失败")?;
        self.observability
            .validate()
            .context("可观测性配置验证失败")?;

        Ok(())
    }
}

fn default_model_info() -> HttpEndpointConfig {
    HttpEndpointConfig::new("http://localhost:8001")
}

fn default_sensor_data() -> HttpEndpointConfig {
    HttpEndpointConfig::new("http://localhost:8002")
}

fn default_model_serving() -> HttpEndpointConfig {
    HttpEndpointConfig::new("http://localhost:8003")
}

fn default_prediction_storage() -> HttpEndpointConfig {
    HttpEndpointConfig::new("http://localhost:8004")
}

fn default_metadata_storage() -> HttpEndpointConfig {
    HttpEndpointConfig::new("http://localhost:8005")
}

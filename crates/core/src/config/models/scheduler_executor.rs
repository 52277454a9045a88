use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 调度器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// 模型目录同步间隔（秒）
    #[serde(alias = "configuration_sync_interval")]
    pub configuration_sync_interval_seconds: u64,
    /// 预测派发间隔，同时也是每个任务时间窗口的长度（秒）
    #[serde(alias = "continuous_prediction_interval")]
    pub continuous_prediction_interval_seconds: u64,
    /// 控制循环的轮询粒度（毫秒）
    pub poll_interval_ms: u64,
    /// 项目过滤器，为空表示所有项目
    pub projects: Vec<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            configuration_sync_interval_seconds: 60,
            continuous_prediction_interval_seconds: 1800,
            poll_interval_ms: 1000,
            projects: Vec::new(),
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.configuration_sync_interval_seconds == 0 {
            return Err(anyhow::anyhow!("配置同步间隔必须大于0"));
        }

        if self.continuous_prediction_interval_seconds == 0 {
            return Err(anyhow::anyhow!("连续预测间隔必须大于0"));
        }

        if self.poll_interval_ms == 0 {
            return Err(anyhow::anyhow!("轮询间隔必须大于0"));
        }

        if let Some(project) = self.projects.iter().find(|p| p.trim().is_empty()) {
            return Err(anyhow::anyhow!("项目过滤器包含空项目名: {:?}", project));
        }

        Ok(())
    }

    pub fn configuration_sync_interval(&self) -> Duration {
        Duration::from_secs(self.configuration_sync_interval_seconds)
    }

    pub fn continuous_prediction_interval(&self) -> Duration {
        Duration::from_secs(self.continuous_prediction_interval_seconds)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// 执行器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// 部署的执行器实例数量；`all` 模式下在进程内启动同样数量的执行器
    pub instance_count: usize,
    /// 执行器实例标识，未配置时使用主机名
    pub instance_id: Option<String>,
    /// 单次取任务的等待时间（毫秒）
    pub poll_timeout_ms: u64,
    /// 连续队列错误达到该次数后退出进程
    pub max_consecutive_queue_failures: u32,
    /// 预测所需的最少数据行数
    pub min_data_points: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            instance_count: 1,
            instance_id: None,
            poll_timeout_ms: 1000,
            max_consecutive_queue_failures: 5,
            min_data_points: 1,
        }
    }
}

impl ExecutorConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.instance_count == 0 {
            return Err(anyhow::anyhow!("执行器实例数必须大于0"));
        }

        if let Some(id) = &self.instance_id {
            if id.trim().is_empty() {
                return Err(anyhow::anyhow!("执行器实例ID不能为空"));
            }
        }

        if self.poll_timeout_ms == 0 {
            return Err(anyhow::anyhow!("取任务超时时间必须大于0"));
        }

        if self.max_consecutive_queue_failures == 0 {
            return Err(anyhow::anyhow!("最大连续队列失败次数必须大于0"));
        }

        Ok(())
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    /// 解析实例标识：配置优先，其次主机名
    pub fn resolved_instance_id(&self) -> String {
        if let Some(id) = &self.instance_id {
            return id.clone();
        }
        hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "executor".to_string())
    }
}

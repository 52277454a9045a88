use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 外部HTTP服务端点配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HttpEndpointConfig {
    pub base_url: String,
    /// 静态Bearer令牌
    #[serde(default)]
    pub bearer_token: Option<String>,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl HttpEndpointConfig {
    pub fn new<S: Into<String>>(base_url: S) -> Self {
        Self {
            base_url: base_url.into(),
            bearer_token: None,
            timeout_seconds: default_timeout_seconds(),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let parsed = url::Url::parse(&self.base_url)
            .map_err(|e| anyhow::anyhow!("无效的服务地址: {}: {}", self.base_url, e))?;

        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(anyhow::anyhow!(
                "服务地址必须是http://或https://格式: {}",
                self.base_url
            ));
        }

        if self.timeout_seconds == 0 {
            return Err(anyhow::anyhow!("请求超时时间必须大于0"));
        }

        if let Some(token) = &self.bearer_token {
            if token.trim().is_empty() {
                return Err(anyhow::anyhow!("Bearer令牌不能为空字符串"));
            }
        }

        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

fn default_timeout_seconds() -> u64 {
    30
}

/// 可观测性配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_format: String,
    pub metrics_enabled: bool,
    pub metrics_bind_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_bind_address: "0.0.0.0:9090".to_string(),
        }
    }
}

impl ObservabilityConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(anyhow::anyhow!(
                "无效的日志级别: {}，支持的级别: {:?}",
                self.log_level,
                valid_levels
            ));
        }

        let valid_formats = ["json", "pretty", "compact"];
        if !valid_formats.contains(&self.log_format.as_str()) {
            return Err(anyhow::anyhow!(
                "无效的日志格式: {}，支持的格式: {:?}",
                self.log_format,
                valid_formats
            ));
        }

        if self.metrics_enabled {
            self.metrics_socket_addr()?;
        }

        Ok(())
    }

    pub fn metrics_socket_addr(&self) -> anyhow::Result<SocketAddr> {
        self.metrics_bind_address
            .parse()
            .map_err(|e| anyhow::anyhow!("无效的指标监听地址 {}: {}", self.metrics_bind_address, e))
    }
}

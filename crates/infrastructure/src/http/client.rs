use prediction_core::{HttpEndpointConfig, SchedulerError, SchedulerResult, TaskError};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use url::Url;

/// 协作服务共用的 HTTP 客户端
///
/// 负责基础地址、可选的 Bearer 令牌、超时以及状态码到 `TaskError` 的映射。
#[derive(Debug, Clone)]
pub struct ApiClient {
    service: &'static str,
    base_url: Url,
    bearer_token: Option<String>,
    client: reqwest::Client,
}

impl ApiClient {
    pub fn new(service: &'static str, endpoint: &HttpEndpointConfig) -> SchedulerResult<Self> {
        let base_url = Url::parse(&endpoint.base_url).map_err(|e| {
            SchedulerError::config_error(format!("{service} 服务地址无效: {}: {e}", endpoint.base_url))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(SchedulerError::config_error(format!(
                "{service} 服务地址不能作为基础地址: {}",
                endpoint.base_url
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(endpoint.timeout())
            .build()
            .map_err(|e| SchedulerError::config_error(format!("创建 {service} HTTP客户端失败: {e}")))?;

        Ok(Self {
            service,
            base_url,
            bearer_token: endpoint.bearer_token.clone(),
            client,
        })
    }

    pub fn service(&self) -> &'static str {
        self.service
    }

    /// 在基础地址后拼接路径段，每段单独转义
    pub fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, &str)],
    ) -> Result<T, TaskError> {
        let request = self.client.get(self.endpoint(segments)).query(query);
        let response = self.send(request).await?;
        self.decode(response).await
    }

    pub async fn post_json<B, T>(&self, segments: &[&str], body: &B) -> Result<T, TaskError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.client.post(self.endpoint(segments)).json(body);
        let response = self.send(request).await?;
        self.decode(response).await
    }

    pub async fn put_json<B>(&self, segments: &[&str], body: &B) -> Result<(), TaskError>
    where
        B: Serialize + ?Sized,
    {
        let request = self.client.put(self.endpoint(segments)).json(body);
        self.send(request).await?;
        Ok(())
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, TaskError> {
        let request = match &self.bearer_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request.send().await.map_err(|e| {
            TaskError::from(anyhow::Error::new(e).context(format!("请求 {} 服务失败", self.service)))
        })?;

        let status = response.status();
        debug!("{} 服务响应: {} {}", self.service, status, response.url());
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(status_error(self.service, status, &body))
    }

    async fn decode<T: DeserializeOwned>(&self, response: Response) -> Result<T, TaskError> {
        let status = response.status();
        response.json::<T>().await.map_err(|e| {
            TaskError::upstream(
                Some(status.as_u16()),
                format!("{} 服务返回了无法解析的响应: {e}", self.service),
            )
        })
    }
}

/// 非成功状态码映射为上游错误，优先使用响应体中的 `message` 字段
pub fn status_error(service: &str, status: StatusCode, body: &str) -> TaskError {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("message")
                .and_then(|v| v.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string());

    match status {
        StatusCode::NOT_FOUND | StatusCode::GONE | StatusCode::UNPROCESSABLE_ENTITY => {
            TaskError::upstream(
                Some(status.as_u16()),
                format!("{service} 服务拒绝请求: {message}"),
            )
        }
        _ => TaskError::upstream(
            Some(status.as_u16()),
            format!("{service} 服务请求失败 ({status}): {message}"),
        ),
    }
}

use bytes::Bytes;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:146.0) Gecko/20100101 Firefox/146.0";

#[derive(Debug, Error)]
pub enum HttpClientError {
    #[error("请求超时")]
    Timeout,
    #[error("请求失败: {0}")]
    RequestFailed(String),
    #[error("响应异常状态码: {0}")]
    BadStatus(u16),
}

/// 上游 HTTP 客户端 (带重试)
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    max_retries: u32,
    backoff: Duration,
}

impl HttpClient {
    pub fn new(timeout: Duration, max_retries: u32) -> Result<Self, HttpClientError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(|e| HttpClientError::RequestFailed(e.to_string()))?;

        Ok(Self {
            client,
            max_retries: max_retries.max(1),
            backoff: Duration::from_secs(2),
        })
    }

    /// 重试间隔的基数, 第 n 次重试前等待 n * backoff
    #[allow(dead_code)]
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// GET 请求并返回响应体
    pub async fn get_bytes(&self, url: &str) -> Result<Bytes, HttpClientError> {
        let mut last_err = HttpClientError::RequestFailed("no attempt made".to_string());

        for attempt in 0..self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(self.backoff * attempt).await;
                warn!("重试请求 {} ({}/{})", url, attempt + 1, self.max_retries);
            }

            match self.get_once(url).await {
                Ok(body) => return Ok(body),
                Err(e) => {
                    warn!("请求失败 {}: {}", url, e);
                    last_err = e;
                }
            }
        }

        Err(last_err)
    }

    async fn get_once(&self, url: &str) -> Result<Bytes, HttpClientError> {
        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    HttpClientError::Timeout
                } else {
                    HttpClientError::RequestFailed(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(HttpClientError::BadStatus(response.status().as_u16()));
        }

        response
            .bytes()
            .await
            .map_err(|e| HttpClientError::RequestFailed(e.to_string()))
    }
}

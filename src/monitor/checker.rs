//! HTTP检测执行器
//!
//! 对一个目标发起恰好一次请求，在固定超时内完成并给出判定。
//! 普通HTTP错误（4xx/5xx）是正常结果，只有传输层失败才使用哨兵状态。

use crate::error::CheckError;
use crate::monitor::outcome::{CheckOutcome, ResponseCode};
use crate::monitor::target::TargetDescriptor;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, RequestBuilder};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::debug;

/// 默认检测超时时间
pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(30);

/// 检测执行器trait
#[async_trait]
pub trait CheckExecutor: Send + Sync {
    /// 执行一次检测，永远返回结果而不是错误
    ///
    /// # 参数
    /// * `target` - 目标参数快照
    ///
    /// # 返回
    /// * `CheckOutcome` - 检测结果
    async fn execute(&self, target: &TargetDescriptor) -> CheckOutcome;

    /// 并发检测多个目标
    async fn execute_batch(&self, targets: &[TargetDescriptor]) -> Vec<CheckOutcome> {
        let futures = targets.iter().map(|target| self.execute(target));
        futures::future::join_all(futures).await
    }
}

/// 基于reqwest的HTTP检测执行器
pub struct HttpCheckExecutor {
    /// HTTP客户端
    client: Client,
    /// 固定超时时间
    timeout: Duration,
    /// 所有请求共用的请求头（目标自身的同名请求头优先）
    default_headers: HashMap<String, String>,
}

impl HttpCheckExecutor {
    /// 创建新的HTTP检测执行器
    ///
    /// # 参数
    /// * `timeout` - 单次检测的最长等待时间
    ///
    /// # 返回
    /// * `Result<Self, CheckError>` - 执行器实例
    pub fn new(timeout: Duration) -> Result<Self, CheckError> {
        Self::with_user_agent(timeout, format!("{}/{}", crate::APP_NAME, crate::VERSION))
    }

    /// 使用自定义 User-Agent 创建执行器
    pub fn with_user_agent(timeout: Duration, user_agent: String) -> Result<Self, CheckError> {
        if timeout.is_zero() {
            return Err(CheckError::InvalidRequest("超时时间不能为0".to_string()));
        }

        let client = Client::builder().user_agent(user_agent).build()?;

        Ok(Self {
            client,
            timeout,
            default_headers: HashMap::new(),
        })
    }

    /// 设置共用请求头
    pub fn with_default_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.default_headers = headers;
        self
    }

    /// 当前超时设置
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// 构建HTTP请求
    fn build_request(&self, target: &TargetDescriptor) -> RequestBuilder {
        let mut request = self.client.request(target.method.into(), &target.url);

        for (key, value) in &self.default_headers {
            if !target.headers.contains_key(key) {
                request = request.header(key, value);
            }
        }
        for (key, value) in &target.headers {
            request = request.header(key, value);
        }

        if target.method.carries_body() {
            if let Some(body) = &target.body {
                request = request.json(body);
            }
        }

        request
    }

    /// 将传输层错误归类为哨兵状态和可读描述
    fn classify_transport_error(error: &reqwest::Error) -> (ResponseCode, String) {
        if error.is_timeout() {
            return (ResponseCode::Timeout, "Request timeout".to_string());
        }

        let message = if error.is_connect() {
            "Connection refused".to_string()
        } else if error.is_builder() || error.is_request() {
            format!("Invalid request: {error}")
        } else {
            let error_str = error.to_string();
            let lower = error_str.to_lowercase();
            if lower.contains("dns") {
                "DNS resolution failed".to_string()
            } else if lower.contains("certificate") || lower.contains("tls") {
                "SSL/TLS certificate error".to_string()
            } else {
                format!("Request failed: {error_str}")
            }
        };

        (ResponseCode::NetworkError, message)
    }
}

#[async_trait]
impl CheckExecutor for HttpCheckExecutor {
    async fn execute(&self, target: &TargetDescriptor) -> CheckOutcome {
        let request = self.build_request(target);

        let checked_at = Utc::now();
        let start_time = Instant::now();
        let response_result = timeout(self.timeout, request.send()).await;
        let elapsed_ms = start_time.elapsed().as_millis() as u64;

        let outcome = match response_result {
            Ok(Ok(response)) => CheckOutcome::new(
                target.id.clone(),
                target.method,
                target.url.clone(),
                ResponseCode::Http(response.status().as_u16()),
            ),
            Ok(Err(e)) => {
                let (code, message) = Self::classify_transport_error(&e);
                CheckOutcome::new(target.id.clone(), target.method, target.url.clone(), code)
                    .with_message(message)
            }
            Err(_) => CheckOutcome::new(
                target.id.clone(),
                target.method,
                target.url.clone(),
                ResponseCode::Timeout,
            )
            .with_message(format!("Request timeout after {}s", self.timeout.as_secs_f64())),
        };

        debug!(
            target_id = %target.id,
            code = %outcome.code,
            elapsed_ms,
            "检测完成"
        );

        outcome
            .with_elapsed_ms(elapsed_ms)
            .with_checked_at(checked_at)
    }
}

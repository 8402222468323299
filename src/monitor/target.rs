//! 监控目标数据结构
//!
//! 定义被监控服务的持久化记录、单次检测使用的参数快照以及部分字段更新

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// 检测间隔下限（秒）
pub const MIN_INTERVAL_SECONDS: u64 = 60;

/// 检测间隔上限（秒）
pub const MAX_INTERVAL_SECONDS: u64 = 3600;

/// 监控目标标识
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(String);

impl TargetId {
    /// 使用给定字符串创建标识
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TargetId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for TargetId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// 支持的HTTP方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
}

impl HttpMethod {
    /// 该方法是否携带请求体
    pub fn carries_body(&self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "HEAD" => Ok(HttpMethod::Head),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            "OPTIONS" => Ok(HttpMethod::Options),
            other => Err(format!("不支持的HTTP方法: {other}")),
        }
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Head => reqwest::Method::HEAD,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Options => reqwest::Method::OPTIONS,
        }
    }
}

/// 目标当前状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetStatus {
    /// 尚未检测
    #[default]
    Unknown,
    /// 服务正常
    Up,
    /// 服务异常
    Down,
}

impl fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetStatus::Unknown => write!(f, "未知"),
            TargetStatus::Up => write!(f, "正常"),
            TargetStatus::Down => write!(f, "异常"),
        }
    }
}

/// 持久化的监控目标
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    /// 目标标识
    pub id: TargetId,
    /// 显示名称
    pub name: String,
    /// 检测URL
    pub url: String,
    /// HTTP方法
    #[serde(default)]
    pub method: HttpMethod,
    /// 请求头
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// 请求体（仅POST/PUT/PATCH发送）
    #[serde(default)]
    pub body: Option<serde_json::Value>,
    /// 检测间隔（秒）
    pub interval_seconds: u64,
    /// 当前状态
    #[serde(default)]
    pub status: TargetStatus,
    /// 最后检测时间
    #[serde(default)]
    pub last_checked: Option<DateTime<Utc>>,
}

impl Target {
    /// 创建尚未检测过的目标
    pub fn new(
        id: TargetId,
        name: impl Into<String>,
        url: impl Into<String>,
        method: HttpMethod,
        interval_seconds: u64,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            url: url.into(),
            method,
            headers: HashMap::new(),
            body: None,
            interval_seconds,
            status: TargetStatus::Unknown,
            last_checked: None,
        }
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// 检测间隔
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    /// 生成本次检测的参数快照
    pub fn descriptor(&self) -> TargetDescriptor {
        TargetDescriptor {
            id: self.id.clone(),
            url: self.url.clone(),
            method: self.method,
            headers: self.headers.clone(),
            body: if self.method.carries_body() {
                self.body.clone()
            } else {
                None
            },
            interval: self.interval(),
            last_checked: self.last_checked,
        }
    }

    /// 检测参数是否与另一个目标不同（忽略状态字段）
    pub fn check_params_differ(&self, other: &Target) -> bool {
        self.name != other.name
            || self.url != other.url
            || self.method != other.method
            || self.headers != other.headers
            || self.body != other.body
            || self.interval_seconds != other.interval_seconds
    }

    /// 验证目标参数
    pub fn validate(&self) -> Result<(), String> {
        if self.id.as_str().trim().is_empty() {
            return Err("目标标识不能为空".to_string());
        }
        if self.name.trim().is_empty() {
            return Err(format!("目标 {} 的名称不能为空", self.id));
        }
        if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            return Err(format!("目标 {} 的URL格式无效: {}", self.id, self.url));
        }
        if !(MIN_INTERVAL_SECONDS..=MAX_INTERVAL_SECONDS).contains(&self.interval_seconds) {
            return Err(format!(
                "目标 {} 的检测间隔 {} 秒超出范围 [{}, {}]",
                self.id, self.interval_seconds, MIN_INTERVAL_SECONDS, MAX_INTERVAL_SECONDS
            ));
        }
        Ok(())
    }
}

/// 单次检测使用的参数快照
#[derive(Debug, Clone, PartialEq)]
pub struct TargetDescriptor {
    pub id: TargetId,
    pub url: String,
    pub method: HttpMethod,
    pub headers: HashMap<String, String>,
    pub body: Option<serde_json::Value>,
    pub interval: Duration,
    pub last_checked: Option<DateTime<Utc>>,
}

/// 目标的部分字段更新
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TargetUpdate {
    pub name: Option<String>,
    pub url: Option<String>,
    pub method: Option<HttpMethod>,
    pub headers: Option<HashMap<String, String>>,
    pub body: Option<Option<serde_json::Value>>,
    pub interval_seconds: Option<u64>,
    pub status: Option<TargetStatus>,
    pub last_checked: Option<DateTime<Utc>>,
}

impl TargetUpdate {
    /// 检测结果写回：状态与最后检测时间
    pub fn check_result(status: TargetStatus, checked_at: DateTime<Utc>) -> Self {
        Self {
            status: Some(status),
            last_checked: Some(checked_at),
            ..Default::default()
        }
    }

    /// 用新定义覆盖检测参数，保留状态字段
    pub fn check_params(target: &Target) -> Self {
        Self {
            name: Some(target.name.clone()),
            url: Some(target.url.clone()),
            method: Some(target.method),
            headers: Some(target.headers.clone()),
            body: Some(target.body.clone()),
            interval_seconds: Some(target.interval_seconds),
            ..Default::default()
        }
    }

    /// 应用到目标
    pub fn apply_to(self, target: &mut Target) {
        if let Some(name) = self.name {
            target.name = name;
        }
        if let Some(url) = self.url {
            target.url = url;
        }
        if let Some(method) = self.method {
            target.method = method;
        }
        if let Some(headers) = self.headers {
            target.headers = headers;
        }
        if let Some(body) = self.body {
            target.body = body;
        }
        if let Some(interval) = self.interval_seconds {
            target.interval_seconds = interval;
        }
        if let Some(status) = self.status {
            target.status = status;
        }
        if let Some(last_checked) = self.last_checked {
            target.last_checked = Some(last_checked);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_target() -> Target {
        Target::new(
            TargetId::new("api"),
            "API",
            "https://example.test/health",
            HttpMethod::Get,
            60,
        )
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!("get".parse::<HttpMethod>().unwrap(), HttpMethod::Get);
        assert_eq!("PATCH".parse::<HttpMethod>().unwrap(), HttpMethod::Patch);
        assert!("TRACE".parse::<HttpMethod>().is_err());
    }

    #[test]
    fn test_body_only_for_payload_methods() {
        let target = sample_target().with_body(serde_json::json!({"ping": true}));
        assert!(target.descriptor().body.is_none());

        let mut post = target.clone();
        post.method = HttpMethod::Post;
        assert_eq!(
            post.descriptor().body,
            Some(serde_json::json!({"ping": true}))
        );
    }

    #[test]
    fn test_validate_interval_bounds() {
        let mut target = sample_target();
        assert!(target.validate().is_ok());

        target.interval_seconds = 59;
        assert!(target.validate().unwrap_err().contains("检测间隔"));

        target.interval_seconds = 3600;
        assert!(target.validate().is_ok());

        target.interval_seconds = 3601;
        assert!(target.validate().is_err());
    }

    #[test]
    fn test_validate_url() {
        let mut target = sample_target();
        target.url = "ftp://example.test".to_string();
        assert!(target.validate().unwrap_err().contains("URL"));
    }

    #[test]
    fn test_update_apply() {
        let mut target = sample_target();
        let now = Utc::now();
        TargetUpdate::check_result(TargetStatus::Down, now).apply_to(&mut target);

        assert_eq!(target.status, TargetStatus::Down);
        assert_eq!(target.last_checked, Some(now));
        assert_eq!(target.interval_seconds, 60);

        let mut changed = target.clone();
        changed.interval_seconds = 120;
        changed.status = TargetStatus::Unknown;
        TargetUpdate::check_params(&changed).apply_to(&mut target);

        assert_eq!(target.interval_seconds, 120);
        assert_eq!(target.status, TargetStatus::Down);
    }

    #[test]
    fn test_check_params_differ_ignores_status() {
        let a = sample_target();
        let mut b = a.clone();
        b.status = TargetStatus::Up;
        b.last_checked = Some(Utc::now());
        assert!(!a.check_params_differ(&b));

        b.url = "https://example.test/other".to_string();
        assert!(a.check_params_differ(&b));
    }

    #[test]
    fn test_target_serialization() {
        let json = serde_json::to_string(&sample_target()).unwrap();
        assert!(json.contains("\"method\":\"GET\""));
        assert!(json.contains("\"status\":\"unknown\""));

        let back: Target = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sample_target());
    }
}

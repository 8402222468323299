//! 检测结果数据结构
//!
//! 定义单次检测的结果、成功/失败判定以及写入历史的日志记录

use crate::monitor::target::{HttpMethod, TargetId, TargetStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// 响应状态：真实HTTP状态码，或网络层失败的哨兵值
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseCode {
    /// 收到了HTTP响应
    Http(u16),
    /// 在固定超时时间内未完成
    Timeout,
    /// DNS、连接被拒绝等传输层失败
    NetworkError,
}

impl ResponseCode {
    /// 真实HTTP状态码（哨兵值返回 None）
    pub fn http_code(&self) -> Option<u16> {
        match self {
            ResponseCode::Http(code) => Some(*code),
            _ => None,
        }
    }

    /// 是否为网络层失败
    pub fn is_transport_failure(&self) -> bool {
        !matches!(self, ResponseCode::Http(_))
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseCode::Http(code) => write!(f, "{code}"),
            ResponseCode::Timeout => write!(f, "TIMEOUT"),
            ResponseCode::NetworkError => write!(f, "NETWORK_ERROR"),
        }
    }
}

/// 成功/失败判定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Success,
    Failure,
}

impl Classification {
    /// 由响应状态判定：小于400为成功，其余（含哨兵值）为失败
    pub fn from_code(code: ResponseCode) -> Self {
        match code {
            ResponseCode::Http(status) if status < 400 => Classification::Success,
            _ => Classification::Failure,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Classification::Success)
    }

    /// 对应的目标状态
    pub fn target_status(&self) -> TargetStatus {
        match self {
            Classification::Success => TargetStatus::Up,
            Classification::Failure => TargetStatus::Down,
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::Success => write!(f, "success"),
            Classification::Failure => write!(f, "failure"),
        }
    }
}

/// 单次检测结果（不单独持久化）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckOutcome {
    /// 本次检测的唯一标识，用于关联日志
    pub check_id: Uuid,
    /// 目标标识
    pub target_id: TargetId,
    /// 使用的HTTP方法
    pub method: HttpMethod,
    /// 检测URL
    pub url: String,
    /// 响应状态
    pub code: ResponseCode,
    /// 判定结果
    pub classification: Classification,
    /// 耗时（毫秒）
    pub elapsed_ms: u64,
    /// 可读描述
    pub message: String,
    /// 发起检测的时间
    pub checked_at: DateTime<Utc>,
}

impl CheckOutcome {
    /// 创建检测结果，判定由响应状态推导
    pub fn new(
        target_id: TargetId,
        method: HttpMethod,
        url: impl Into<String>,
        code: ResponseCode,
    ) -> Self {
        let classification = Classification::from_code(code);
        Self {
            check_id: Uuid::new_v4(),
            target_id,
            method,
            url: url.into(),
            code,
            classification,
            elapsed_ms: 0,
            message: default_message(code),
            checked_at: Utc::now(),
        }
    }

    /// 设置耗时
    pub fn with_elapsed_ms(mut self, elapsed_ms: u64) -> Self {
        self.elapsed_ms = elapsed_ms;
        self
    }

    /// 设置描述
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// 设置检测时间
    pub fn with_checked_at(mut self, checked_at: DateTime<Utc>) -> Self {
        self.checked_at = checked_at;
        self
    }

    /// 转换为历史日志记录
    pub fn to_log_record(&self) -> LogRecord {
        LogRecord {
            method: self.method,
            classification: self.classification,
            code: self.code,
            message: self.message.clone(),
            metadata: LogMetadata {
                url: self.url.clone(),
                elapsed_ms: self.elapsed_ms,
                timestamp: self.checked_at,
            },
        }
    }
}

fn default_message(code: ResponseCode) -> String {
    match code {
        ResponseCode::Http(status) => format!(
            "HTTP {} {}",
            status,
            reqwest::StatusCode::from_u16(status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or("Unknown")
        ),
        ResponseCode::Timeout => "Request timeout".to_string(),
        ResponseCode::NetworkError => "Network error".to_string(),
    }
}

/// 历史日志记录，写入后不再修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub method: HttpMethod,
    pub classification: Classification,
    pub code: ResponseCode,
    pub message: String,
    pub metadata: LogMetadata,
}

/// 日志记录元数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogMetadata {
    pub url: String,
    pub elapsed_ms: u64,
    pub timestamp: DateTime<Utc>,
}

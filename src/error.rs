//! 错误处理模块
//!
//! 定义应用程序的统一错误类型

use thiserror::Error;

/// Service Watch 应用程序的主要错误类型
#[derive(Error, Debug)]
pub enum MonitorError {
    /// 配置相关错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    /// 存储相关错误
    #[error("存储错误: {0}")]
    Storage(#[from] StorageError),

    /// 检测器相关错误
    #[error("检测器错误: {0}")]
    Check(#[from] CheckError),

    /// IO错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON序列化/反序列化错误
    #[error("JSON错误: {0}")]
    Json(#[from] serde_json::Error),

    /// 其他错误
    #[error("其他错误: {0}")]
    Other(#[from] anyhow::Error),
}

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 配置文件解析错误
    #[error("配置文件解析失败: {0}")]
    ParseError(String),

    /// 配置验证错误
    #[error("配置验证失败: {0}")]
    ValidationError(String),

    /// 配置文件不存在
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },

    /// 环境变量替换错误
    #[error("环境变量替换失败: {var}")]
    EnvVarError { var: String },
}

/// 存储错误类型
#[derive(Error, Debug)]
pub enum StorageError {
    /// 目标不存在
    #[error("监控目标不存在: {id}")]
    NotFound { id: String },

    /// 目标已存在
    #[error("监控目标已存在: {id}")]
    AlreadyExists { id: String },

    /// 文件读写失败
    #[error("存储文件读写失败: {0}")]
    Io(#[from] std::io::Error),

    /// 序列化失败
    #[error("存储数据序列化失败: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 存储暂时不可用
    #[error("存储不可用: {0}")]
    Unavailable(String),
}

impl StorageError {
    /// 是否为"目标不存在"
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}

/// 检测器错误类型
///
/// 仅在构建检测器时出现，单次检测永远不会返回错误。
#[derive(Error, Debug)]
pub enum CheckError {
    /// HTTP客户端构建失败
    #[error("HTTP客户端构建失败: {0}")]
    ClientBuild(#[from] reqwest::Error),

    /// 请求参数无效
    #[error("无效的请求参数: {0}")]
    InvalidRequest(String),
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, MonitorError>;

//! 配置数据结构定义
//!
//! 定义应用程序的配置结构体和验证逻辑

use crate::monitor::target::{HttpMethod, Target, TargetId, MIN_INTERVAL_SECONDS};
use crate::storage::DEFAULT_MAX_LOG_RECORDS;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

/// 请求超时上限（秒）
pub const MAX_REQUEST_TIMEOUT_SECONDS: u64 = 300;

/// 主配置结构，包含全局配置和监控目标列表
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// 全局配置项
    #[serde(default)]
    pub global: GlobalConfig,
    /// 监控目标列表
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

/// 全局配置结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GlobalConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// 请求超时时间（秒）
    #[serde(default = "default_timeout")]
    pub request_timeout_seconds: u64,
    /// 每个目标保留的历史记录数
    #[serde(default = "default_max_log_records")]
    pub max_log_records: usize,
    /// 数据文件路径
    #[serde(default = "default_data_file")]
    pub data_file: PathBuf,
    /// 自定义 User-Agent
    #[serde(default)]
    pub user_agent: Option<String>,
    /// 全局请求头
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            request_timeout_seconds: default_timeout(),
            max_log_records: default_max_log_records(),
            data_file: default_data_file(),
            user_agent: None,
            headers: HashMap::new(),
        }
    }
}

/// 监控目标配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TargetConfig {
    /// 目标标识
    pub id: String,
    /// 目标名称
    pub name: String,
    /// 目标URL
    pub url: String,
    /// HTTP方法
    #[serde(default)]
    pub method: HttpMethod,
    /// 检测间隔（秒）
    #[serde(default = "default_interval")]
    pub interval_seconds: u64,
    /// 目标特定的请求头
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// 请求体（仅POST/PUT/PATCH发送）
    #[serde(default)]
    pub body: Option<serde_json::Value>,
}

impl TargetConfig {
    /// 转换为尚未检测过的监控目标
    pub fn to_target(&self) -> Target {
        let mut target = Target::new(
            TargetId::new(self.id.clone()),
            self.name.clone(),
            self.url.clone(),
            self.method,
            self.interval_seconds,
        )
        .with_headers(self.headers.clone());
        target.body = self.body.clone();
        target
    }
}

// 默认值函数
fn default_log_level() -> String {
    "info".to_string()
}
fn default_timeout() -> u64 {
    30
}
fn default_max_log_records() -> usize {
    DEFAULT_MAX_LOG_RECORDS
}
fn default_data_file() -> PathBuf {
    PathBuf::from("service-watch.json")
}
fn default_interval() -> u64 {
    MIN_INTERVAL_SECONDS
}

/// 配置验证函数
///
/// # 参数
/// * `config` - 要验证的配置
///
/// # 返回
/// * `Result<(), String>` - 验证结果，错误时返回错误信息
pub fn validate_config(config: &Config) -> Result<(), String> {
    // 验证全局配置
    if config.global.request_timeout_seconds == 0 {
        return Err("请求超时时间不能为0".to_string());
    }

    if config.global.request_timeout_seconds > MAX_REQUEST_TIMEOUT_SECONDS {
        return Err(format!(
            "请求超时时间不能超过{}秒",
            MAX_REQUEST_TIMEOUT_SECONDS
        ));
    }

    if config.global.max_log_records == 0 {
        return Err("历史记录数不能为0".to_string());
    }

    // 验证日志级别
    let valid_log_levels = ["debug", "info", "warn", "error"];
    if !valid_log_levels.contains(&config.global.log_level.as_str()) {
        return Err(format!(
            "无效的日志级别: {}，支持的级别: {:?}",
            config.global.log_level, valid_log_levels
        ));
    }

    // 验证目标配置
    let mut seen = HashSet::new();
    for target in &config.targets {
        if !seen.insert(target.id.as_str()) {
            return Err(format!("目标标识重复: {}", target.id));
        }

        target
            .to_target()
            .validate()
            .map_err(|e| format!("目标配置无效: {}", e))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_target() -> TargetConfig {
        TargetConfig {
            id: "api".to_string(),
            name: "API".to_string(),
            url: "https://example.com/health".to_string(),
            method: HttpMethod::Get,
            interval_seconds: 60,
            headers: HashMap::new(),
            body: None,
        }
    }

    fn create_test_config() -> Config {
        Config {
            global: GlobalConfig::default(),
            targets: vec![create_test_target()],
        }
    }

    #[test]
    fn test_config_serialization() {
        let config = create_test_config();

        let serialized = toml::to_string(&config).expect("序列化失败");
        assert!(!serialized.is_empty());

        let deserialized: Config = toml::from_str(&serialized).expect("反序列化失败");
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_config_validation() {
        let config = create_test_config();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_empty_target_list_is_valid() {
        let mut config = create_test_config();
        config.targets.clear();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_config_validation_invalid_url() {
        let mut config = create_test_config();
        config.targets[0].url = "invalid-url".to_string();

        let result = validate_config(&config);
        assert!(result.unwrap_err().contains("配置无效"));
    }

    #[test]
    fn test_config_validation_duplicate_id() {
        let mut config = create_test_config();
        config.targets.push(create_test_target());

        let result = validate_config(&config);
        assert!(result.unwrap_err().contains("标识重复"));
    }

    #[test]
    fn test_config_validation_interval_bounds() {
        let mut config = create_test_config();

        config.targets[0].interval_seconds = 59;
        assert!(validate_config(&config).unwrap_err().contains("超出范围"));

        config.targets[0].interval_seconds = 3601;
        assert!(validate_config(&config).is_err());

        config.targets[0].interval_seconds = 3600;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_config_validation_timeout() {
        let mut config = create_test_config();

        config.global.request_timeout_seconds = 0;
        assert!(validate_config(&config).is_err());

        config.global.request_timeout_seconds = 301;
        assert!(validate_config(&config).unwrap_err().contains("不能超过"));
    }

    #[test]
    fn test_config_validation_invalid_log_level() {
        let mut config = create_test_config();
        config.global.log_level = "verbose".to_string();

        assert!(validate_config(&config).unwrap_err().contains("日志级别"));
    }

    #[test]
    fn test_default_values() {
        let config: Config = toml::from_str(
            r#"
[[targets]]
id = "web"
name = "Web"
url = "https://example.com"
"#,
        )
        .expect("解析失败");

        assert_eq!(config.global.log_level, "info");
        assert_eq!(config.global.request_timeout_seconds, 30);
        assert_eq!(config.global.max_log_records, 100);
        assert_eq!(config.global.data_file, PathBuf::from("service-watch.json"));
        assert_eq!(config.targets[0].method, HttpMethod::Get);
        assert_eq!(config.targets[0].interval_seconds, 60);
    }

    #[test]
    fn test_to_target_starts_unknown() {
        let mut target_config = create_test_target();
        target_config.method = HttpMethod::Post;
        target_config.body = Some(serde_json::json!({"ping": true}));

        let target = target_config.to_target();
        assert_eq!(target.id.as_str(), "api");
        assert_eq!(target.status, crate::monitor::TargetStatus::Unknown);
        assert!(target.last_checked.is_none());
        assert_eq!(target.body, Some(serde_json::json!({"ping": true})));
    }
}

//! TOML配置加载
//!
//! 读取配置文件，替换 `${VAR}` 形式的环境变量，解析后立即验证。
//! 任何一步失败都返回 `ConfigError`，不会返回部分可用的配置。

use crate::config::types::{validate_config, Config};
use crate::error::{ConfigError, Result};
use async_trait::async_trait;
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info};

/// 配置加载接口
#[async_trait]
pub trait ConfigLoader: Send + Sync {
    /// 从文件加载并验证配置
    ///
    /// # 参数
    /// * `path` - 配置文件路径
    ///
    /// # 返回
    /// * `Result<Config>` - 通过验证的配置
    async fn load_from_file<P: AsRef<Path> + Send>(&self, path: P) -> Result<Config>;

    /// 从字符串加载并验证配置
    async fn load_from_string(&self, content: &str) -> Result<Config>;

    fn validate(&self, config: &Config) -> Result<()>;
}

/// `${NAME}` 占位符
fn placeholder_pattern() -> Result<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").ok())
        .as_ref()
        .ok_or_else(|| ConfigError::ParseError("环境变量占位符模式无效".to_string()).into())
}

/// TOML配置加载器
#[derive(Debug, Clone)]
pub struct TomlConfigLoader {
    /// 是否替换环境变量占位符
    enable_env_substitution: bool,
    /// 优先于进程环境变量的取值
    env_overrides: HashMap<String, String>,
}

impl TomlConfigLoader {
    pub fn new(enable_env_substitution: bool) -> Self {
        Self {
            enable_env_substitution,
            env_overrides: HashMap::new(),
        }
    }

    /// 指定变量值，替换时优先于进程环境变量
    pub fn with_env_override(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_overrides.insert(name.into(), value.into());
        self
    }

    fn lookup_var(&self, name: &str) -> Option<String> {
        self.env_overrides
            .get(name)
            .cloned()
            .or_else(|| std::env::var(name).ok())
    }

    /// 替换全部占位符；任何一个变量缺失都视为错误
    ///
    /// # 返回
    /// * `Result<String>` - 替换后的内容，错误中带第一个缺失的变量名
    fn substitute_env_vars(&self, content: &str) -> Result<String> {
        if !self.enable_env_substitution {
            return Ok(content.to_string());
        }

        let mut missing: Option<String> = None;
        let substituted = placeholder_pattern()?.replace_all(content, |caps: &Captures| {
            let name = &caps[1];
            self.lookup_var(name).unwrap_or_else(|| {
                missing.get_or_insert_with(|| name.to_string());
                String::new()
            })
        });

        match missing {
            Some(var) => Err(ConfigError::EnvVarError { var }.into()),
            None => Ok(substituted.into_owned()),
        }
    }

    /// 替换、解析并验证
    fn parse(&self, content: &str) -> Result<Config> {
        let content = self.substitute_env_vars(content)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(format!("TOML解析失败: {}", e)))?;
        self.validate(&config)?;
        Ok(config)
    }
}

#[async_trait]
impl ConfigLoader for TomlConfigLoader {
    async fn load_from_file<P: AsRef<Path> + Send>(&self, path: P) -> Result<Config> {
        let path = path.as_ref();

        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                }
                .into());
            }
            Err(e) => {
                return Err(ConfigError::ParseError(format!(
                    "读取 {} 失败: {}",
                    path.display(),
                    e
                ))
                .into());
            }
        };

        let config = self.parse(&content)?;
        info!(
            "已加载配置文件: {}，目标数量: {}",
            path.display(),
            config.targets.len()
        );
        debug!("配置内容: {:?}", config);
        Ok(config)
    }

    async fn load_from_string(&self, content: &str) -> Result<Config> {
        self.parse(content)
    }

    fn validate(&self, config: &Config) -> Result<()> {
        validate_config(config).map_err(|e| ConfigError::ValidationError(e).into())
    }
}

/// 配置文件路径环境变量
pub const CONFIG_PATH_ENV: &str = "SERVICE_WATCH_CONFIG";

/// 获取默认配置文件路径
///
/// 依次使用 `SERVICE_WATCH_CONFIG` 环境变量、当前目录的 config.toml、
/// 用户配置目录下的 service-watch/config.toml
pub fn get_default_config_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_PATH_ENV).filter(|p| !p.is_empty()) {
        return PathBuf::from(path);
    }

    let local = PathBuf::from("config.toml");
    if local.exists() {
        return local;
    }

    dirs::config_dir()
        .map(|config_dir| config_dir.join(crate::APP_NAME).join("config.toml"))
        .unwrap_or(local)
}

/// 初始配置模板
pub fn default_config_template() -> &'static str {
    include_str!("../../templates/config.toml")
}

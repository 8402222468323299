//! 日志系统模块
//!
//! 基于 tracing 的结构化日志配置，log 宏的输出通过 LogTracer 转发

use log::LevelFilter;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, OnceLock};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, prelude::*, registry, EnvFilter, Layer};

/// 全局日志初始化状态
#[derive(Debug, Default)]
struct GlobalLoggingState {
    /// 是否已初始化
    initialized: bool,
    /// 初始化失败时的错误信息
    init_error: Option<String>,
    /// 当前配置
    current_config: Option<LogConfig>,
}

/// 全局日志状态管理器
static GLOBAL_LOGGING_STATE: OnceLock<Mutex<GlobalLoggingState>> = OnceLock::new();

fn global_state() -> MutexGuard<'static, GlobalLoggingState> {
    GLOBAL_LOGGING_STATE
        .get_or_init(|| Mutex::new(GlobalLoggingState::default()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// 日志配置结构
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// 日志级别
    pub level: LevelFilter,
    /// 日志文件路径（可选）
    pub file_path: Option<PathBuf>,
    /// 是否输出到控制台
    pub console: bool,
    /// 是否使用JSON格式
    pub json_format: bool,
    /// 模块级别日志控制
    pub module_levels: HashMap<String, LevelFilter>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LevelFilter::Info,
            file_path: None,
            console: true,
            json_format: false,
            module_levels: HashMap::new(),
        }
    }
}

impl LogConfig {
    /// 使用指定级别创建控制台日志配置
    pub fn with_level(level: LevelFilter) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }
}

/// 解析日志级别字符串
pub fn parse_level(level: &str) -> anyhow::Result<LevelFilter> {
    LevelFilter::from_str(level.trim()).map_err(|_| anyhow::anyhow!("无效的日志级别: {}", level))
}

/// 日志系统管理器
#[derive(Debug)]
pub struct LoggingSystem {
    config: LogConfig,
}

impl LoggingSystem {
    /// 初始化日志系统
    ///
    /// 全局只初始化一次，重复调用直接返回，测试中可以放心多次调用。
    ///
    /// # 参数
    /// * `config` - 日志配置
    ///
    /// # 返回
    /// * `Result<LoggingSystem, anyhow::Error>` - 初始化结果
    pub fn setup_logging(config: LogConfig) -> anyhow::Result<Self> {
        Self::setup_logging_with_options(config, false)
    }

    /// 初始化日志系统（带选项）
    ///
    /// # 参数
    /// * `config` - 日志配置
    /// * `force_reinit` - 之前初始化失败时是否重试
    ///
    /// # 返回
    /// * `Result<LoggingSystem, anyhow::Error>` - 初始化结果
    pub fn setup_logging_with_options(
        config: LogConfig,
        force_reinit: bool,
    ) -> anyhow::Result<Self> {
        {
            let state = global_state();
            if state.initialized && !force_reinit {
                return match &state.init_error {
                    None => Ok(Self { config }),
                    Some(e) => Err(anyhow::anyhow!("日志系统之前初始化失败: {}", e)),
                };
            }
        }

        let init_result = Self::perform_initialization(&config);

        {
            let mut state = global_state();
            state.initialized = true;
            state.current_config = Some(config.clone());
            state.init_error = init_result.as_ref().err().map(|e| e.to_string());
        }

        init_result.map(|_| Self { config })
    }

    /// 执行实际的日志系统初始化
    fn perform_initialization(config: &LogConfig) -> anyhow::Result<()> {
        Self::init_log_tracer()?;
        Self::install_subscriber(config)
    }

    /// 安装 LogTracer（log 宏到 tracing 的桥接），进程内只安装一次
    fn init_log_tracer() -> anyhow::Result<()> {
        static LOG_TRACER_INIT: OnceLock<Result<(), String>> = OnceLock::new();

        LOG_TRACER_INIT
            .get_or_init(|| tracing_log::LogTracer::init().map_err(|e| e.to_string()))
            .clone()
            .map_err(|e| anyhow::anyhow!("LogTracer初始化失败: {}", e))
    }

    /// 日志级别对应的过滤指令；`module` 为空时是全局级别
    fn directive(module: Option<&str>, level: LevelFilter) -> Option<Directive> {
        let level = level.as_str().to_ascii_lowercase();
        let text = match module {
            Some(module) => format!("{module}={level}"),
            None => level,
        };
        text.parse().ok()
    }

    /// 构建过滤器：RUST_LOG 打底，配置中的级别覆盖它
    fn build_env_filter(config: &LogConfig) -> EnvFilter {
        let mut filter = EnvFilter::from_default_env();
        if let Some(directive) = Self::directive(None, config.level) {
            filter = filter.add_directive(directive);
        }

        for (module, level) in &config.module_levels {
            match Self::directive(Some(module), *level) {
                Some(directive) => filter = filter.add_directive(directive),
                None => eprintln!("忽略无效的模块日志级别: {module}"),
            }
        }
        filter
    }

    /// 打开追加写入的日志文件，必要时创建目录
    fn open_log_file(path: &Path) -> anyhow::Result<std::fs::File> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| anyhow::anyhow!("创建日志目录失败: {}", e))?;
        }
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| anyhow::anyhow!("创建日志文件失败: {}", e))
    }

    /// 安装 tracing 订阅者
    ///
    /// 指定日志文件且关闭控制台输出时写文件，否则写标准输出。
    fn install_subscriber(config: &LogConfig) -> anyhow::Result<()> {
        let filter = Self::build_env_filter(config);
        let timer = fmt::time::ChronoUtc::rfc_3339();

        let layer = match (&config.file_path, config.console) {
            (Some(path), false) => fmt::layer()
                .with_writer(Self::open_log_file(path)?)
                .with_timer(timer)
                .with_ansi(false)
                .boxed(),
            _ if config.json_format => fmt::layer()
                .json()
                .with_timer(timer)
                .with_target(true)
                .boxed(),
            _ => fmt::layer().with_timer(timer).with_target(true).boxed(),
        };

        let subscriber = registry().with(filter).with(layer);
        if tracing::subscriber::set_global_default(subscriber).is_err() {
            // 同一进程中已有其他订阅者（例如测试）
            tracing::debug!("tracing 订阅者已存在，沿用现有订阅者");
            return Ok(());
        }

        tracing::debug!("日志配置: {:?}", config);
        Ok(())
    }

    /// 本实例使用的配置
    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// 检查日志系统是否已初始化
    pub fn is_initialized() -> bool {
        global_state().initialized
    }

    /// 获取当前日志配置（如果已初始化）
    pub fn current_config() -> Option<LogConfig> {
        global_state().current_config.clone()
    }

    /// 重置日志系统状态（主要用于测试）
    #[cfg(test)]
    pub fn reset_for_testing() {
        let mut state = global_state();
        state.initialized = false;
        state.init_error = None;
        state.current_config = None;
    }
}

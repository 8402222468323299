//! 命令行参数定义
//!
//! 使用clap定义应用程序的命令行接口

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Service Watch - HTTP服务可用性监控工具
#[derive(Parser, Debug, Clone)]
#[command(
    name = "service-watch",
    version = crate::VERSION,
    about = crate::APP_DESCRIPTION,
    long_about = None
)]
pub struct Args {
    /// 配置文件路径
    #[arg(
        short,
        long,
        global = true,
        value_name = "FILE",
        help = "配置文件路径",
        env = "SERVICE_WATCH_CONFIG"
    )]
    pub config: Option<PathBuf>,

    /// 日志级别（覆盖配置文件中的设置）
    #[arg(
        short,
        long,
        global = true,
        value_enum,
        help = "日志级别",
        env = "SERVICE_WATCH_LOG_LEVEL"
    )]
    pub log_level: Option<LogLevel>,

    /// 以JSON格式输出日志
    #[arg(long, global = true, help = "以JSON格式输出日志")]
    pub json_logs: bool,

    /// 子命令
    #[command(subcommand)]
    pub command: Commands,
}

/// 日志级别枚举
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
pub enum LogLevel {
    /// 调试级别
    Debug,
    /// 信息级别
    Info,
    /// 警告级别
    Warn,
    /// 错误级别
    Error,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// 子命令定义
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// 启动监控，直到收到 Ctrl+C
    Run {
        /// 不监控配置文件变化
        #[arg(long, help = "禁用配置热重载")]
        no_watch: bool,
    },

    /// 执行一次性检测，不写入存储
    Check {
        /// 目标标识（可选，不指定则检测所有目标）
        #[arg(value_name = "ID", help = "目标标识")]
        id: Option<String>,

        /// 输出格式
        #[arg(short, long, value_enum, default_value = "text", help = "输出格式")]
        format: OutputFormat,
    },

    /// 查看目标的持久化状态
    Status {
        /// 输出格式
        #[arg(short, long, value_enum, default_value = "text", help = "输出格式")]
        format: OutputFormat,
    },

    /// 查看目标的检测历史
    Logs {
        /// 目标标识
        #[arg(value_name = "ID", help = "目标标识")]
        id: String,

        /// 只显示最近的若干条
        #[arg(short = 'n', long, value_name = "COUNT", help = "显示条数")]
        limit: Option<usize>,

        /// 输出格式
        #[arg(short, long, value_enum, default_value = "text", help = "输出格式")]
        format: OutputFormat,
    },

    /// 验证配置文件
    Validate {
        /// 配置文件路径
        #[arg(value_name = "FILE", help = "配置文件路径")]
        config_path: Option<PathBuf>,
    },

    /// 初始化配置文件
    Init {
        /// 配置文件路径
        #[arg(
            value_name = "FILE",
            help = "配置文件路径",
            default_value = "config.toml"
        )]
        config_path: PathBuf,

        /// 是否覆盖现有文件
        #[arg(long, help = "覆盖现有文件")]
        force: bool,
    },
}

/// 输出格式枚举
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
pub enum OutputFormat {
    /// 文本格式
    Text,
    /// JSON格式
    Json,
}

impl Args {
    /// 解析命令行参数
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// 获取配置文件路径
    pub fn get_config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(crate::config::get_default_config_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let args = Args::try_parse_from(["service-watch", "--config", "watch.toml", "run"]).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("watch.toml")));
        assert!(matches!(args.command, Commands::Run { no_watch: false }));
        assert!(args.log_level.is_none());
    }

    #[test]
    fn test_parse_logs_with_limit() {
        let args = Args::try_parse_from([
            "service-watch",
            "logs",
            "api",
            "-n",
            "5",
            "--format",
            "json",
            "--log-level",
            "debug",
        ])
        .unwrap();

        match args.command {
            Commands::Logs { id, limit, format } => {
                assert_eq!(id, "api");
                assert_eq!(limit, Some(5));
                assert_eq!(format, OutputFormat::Json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert_eq!(args.log_level, Some(LogLevel::Debug));
    }

    #[test]
    fn test_logs_requires_id() {
        assert!(Args::try_parse_from(["service-watch", "logs"]).is_err());
    }

    #[test]
    fn test_init_defaults() {
        let args = Args::try_parse_from(["service-watch", "init"]).unwrap();
        match args.command {
            Commands::Init { config_path, force } => {
                assert_eq!(config_path, PathBuf::from("config.toml"));
                assert!(!force);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}

//! Service Watch 主程序入口
//!
//! HTTP服务可用性监控工具

use anyhow::{Context, Result};
use clap::Parser;
use service_watch::cli::{command_for, Args, Commands};
use service_watch::config::{ConfigLoader, TomlConfigLoader};
use service_watch::logging::{parse_level, LogConfig, LoggingSystem};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // 解析命令行参数
    let args = Args::parse();

    // 初始化日志系统
    let log_config = LogConfig {
        level: resolve_log_level(&args).await,
        console: true,
        json_format: args.json_logs,
        ..Default::default()
    };

    let _logging_system = LoggingSystem::setup_logging(log_config).context("初始化日志系统失败")?;

    info!("Service Watch v{} 启动", service_watch::VERSION);

    // 执行命令
    if let Err(e) = command_for(&args).execute(&args).await {
        error!("命令执行失败: {:#}", e);
        eprintln!("错误: {e:#}");
        std::process::exit(1);
    }

    Ok(())
}

/// 命令行参数优先，其次是配置文件中的日志级别
async fn resolve_log_level(args: &Args) -> log::LevelFilter {
    if let Some(level) = args.log_level {
        return level.into();
    }

    // 只有长期运行的命令才读取配置中的级别，其他命令保持安静
    if !matches!(args.command, Commands::Run { .. }) {
        return log::LevelFilter::Warn;
    }

    let loader = TomlConfigLoader::new(true);
    match loader.load_from_file(args.get_config_path()).await {
        Ok(config) => parse_level(&config.global.log_level).unwrap_or(log::LevelFilter::Info),
        Err(_) => log::LevelFilter::Info,
    }
}

//! 命令处理逻辑
//!
//! 实现各种CLI命令的处理逻辑

use crate::cli::args::{Args, Commands, OutputFormat};
use crate::config::{
    default_config_template, Config, ConfigLoader, ConfigWatcher, GlobalConfig, TomlConfigLoader,
};
use crate::monitor::{
    CheckExecutor, CheckOutcome, HttpCheckExecutor, LogRecord, MonitorRegistry, Target,
    TargetDescriptor, TargetId,
};
use crate::storage::{JsonFileStore, LogSink, TargetRepository};
use crate::sync::TargetSync;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

/// 配置热重载防抖动延迟
const RELOAD_DEBOUNCE: Duration = Duration::from_millis(500);

/// 命令处理器trait
#[async_trait]
pub trait Command: Send + Sync {
    /// 执行命令
    async fn execute(&self, args: &Args) -> Result<()>;
}

/// 根据参数选择命令处理器
pub fn command_for(args: &Args) -> Box<dyn Command> {
    match &args.command {
        Commands::Run { .. } => Box::new(RunCommand),
        Commands::Check { .. } => Box::new(CheckCommand),
        Commands::Status { .. } => Box::new(StatusCommand),
        Commands::Logs { .. } => Box::new(LogsCommand),
        Commands::Validate { .. } => Box::new(ValidateCommand),
        Commands::Init { .. } => Box::new(InitCommand),
    }
}

/// 加载并验证配置文件
pub async fn load_config(config_path: &Path) -> Result<Config> {
    if !config_path.exists() {
        return Err(anyhow::anyhow!(
            "配置文件不存在: {}\n提示：请运行 'service-watch init' 创建默认配置文件",
            config_path.display()
        ));
    }

    let loader = TomlConfigLoader::new(true);
    let config = loader
        .load_from_file(config_path)
        .await
        .with_context(|| format!("加载配置文件失败: {}", config_path.display()))?;

    Ok(config)
}

/// 数据文件路径，相对路径以配置文件所在目录为基准
pub fn resolve_data_file(config_path: &Path, global: &GlobalConfig) -> PathBuf {
    if global.data_file.is_absolute() {
        return global.data_file.clone();
    }

    match config_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join(&global.data_file),
        _ => global.data_file.clone(),
    }
}

/// 按全局配置构建检测执行器
pub fn build_executor(global: &GlobalConfig) -> Result<HttpCheckExecutor> {
    let timeout = Duration::from_secs(global.request_timeout_seconds);
    let executor = match &global.user_agent {
        Some(user_agent) => HttpCheckExecutor::with_user_agent(timeout, user_agent.clone()),
        None => HttpCheckExecutor::new(timeout),
    }
    .context("创建HTTP检测执行器失败")?;

    Ok(executor.with_default_headers(global.headers.clone()))
}

/// 打开配置指定的数据文件
async fn open_store(config_path: &Path, config: &Config) -> Result<Arc<JsonFileStore>> {
    let data_file = resolve_data_file(config_path, &config.global);
    let store = JsonFileStore::open(&data_file, config.global.max_log_records)
        .await
        .with_context(|| format!("打开数据文件失败: {}", data_file.display()))?;
    Ok(Arc::new(store))
}

/// 运行命令
pub struct RunCommand;

#[async_trait]
impl Command for RunCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Run { no_watch } = &args.command {
            self.run(args, !*no_watch).await
        } else {
            Ok(())
        }
    }
}

impl RunCommand {
    /// 启动监控并等待 Ctrl+C
    async fn run(&self, args: &Args, watch: bool) -> Result<()> {
        let config_path = args.get_config_path();
        let config = load_config(&config_path).await?;

        let store = open_store(&config_path, &config).await?;
        let executor = Arc::new(build_executor(&config.global)?);
        let registry = Arc::new(MonitorRegistry::new(
            store.clone(),
            store.clone(),
            executor,
        ));
        let sync = Arc::new(TargetSync::new(
            store.clone(),
            store.clone(),
            Arc::clone(&registry),
        ));

        sync.apply(&config.targets)
            .await
            .context("同步监控目标失败")?;
        let count = registry
            .initialize()
            .await
            .context("初始化监控注册表失败")?;
        info!("监控已启动，目标数量: {}", count);

        let _watcher = if watch {
            Some(Self::setup_hot_reload(&config_path, config.global.clone(), sync)?)
        } else {
            info!("配置热重载已禁用");
            None
        };

        tokio::signal::ctrl_c()
            .await
            .context("监听中断信号失败")?;
        info!("收到中断信号，正在停止监控...");

        let stopped = registry.shutdown().await;
        info!("监控已停止，取消定时器数量: {}", stopped);
        Ok(())
    }

    /// 监听配置文件变化，把新的目标列表交给同步器
    fn setup_hot_reload(
        config_path: &Path,
        global: GlobalConfig,
        sync: Arc<TargetSync>,
    ) -> Result<ConfigWatcher> {
        let (mut watcher, mut receiver) = ConfigWatcher::new(config_path, global, RELOAD_DEBOUNCE)
            .context("创建配置监控器失败")?;
        watcher.start().context("启动配置监控失败")?;

        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => {
                        if event.global_changed {
                            warn!("全局配置已变更，需要重启后生效");
                        }

                        if let Err(e) = sync.apply(&event.config.targets).await {
                            error!(version = event.version, "应用配置变更失败: {}", e);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("配置变更事件积压，跳过 {} 个旧事件", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        Ok(watcher)
    }
}

/// 检测命令
pub struct CheckCommand;

#[async_trait]
impl Command for CheckCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Check { id, format } = &args.command {
            self.perform_check(args, id.as_deref(), *format).await
        } else {
            Ok(())
        }
    }
}

impl CheckCommand {
    /// 执行一次性检测
    async fn perform_check(&self, args: &Args, id: Option<&str>, format: OutputFormat) -> Result<()> {
        let config = load_config(&args.get_config_path()).await?;
        let executor = build_executor(&config.global)?;

        let descriptors: Vec<TargetDescriptor> = config
            .targets
            .iter()
            .filter(|entry| id.map_or(true, |id| entry.id == id))
            .map(|entry| entry.to_target().descriptor())
            .collect();

        if descriptors.is_empty() {
            return match id {
                Some(id) => Err(anyhow::anyhow!("未找到目标: {}", id)),
                None => {
                    eprintln!("配置中没有任何监控目标");
                    Ok(())
                }
            };
        }

        let outcomes = executor.execute_batch(&descriptors).await;

        match format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&outcomes)?);
            }
            OutputFormat::Text => print_outcomes(&outcomes),
        }

        Ok(())
    }
}

/// 打印文本格式检测结果
fn print_outcomes(outcomes: &[CheckOutcome]) {
    for outcome in outcomes {
        let status_icon = if outcome.classification.is_success() {
            "✓"
        } else {
            "✗"
        };
        println!(
            "{} {} {} {} - {} - {}ms",
            status_icon,
            outcome.target_id,
            outcome.method,
            outcome.url,
            outcome.code,
            outcome.elapsed_ms
        );
        if !outcome.classification.is_success() {
            println!("  {}", outcome.message);
        }
    }
}

/// 状态命令
pub struct StatusCommand;

#[async_trait]
impl Command for StatusCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Status { format } = &args.command {
            let config_path = args.get_config_path();
            let config = load_config(&config_path).await?;
            let store = open_store(&config_path, &config).await?;

            let targets = store.find_all().await?;
            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&targets)?);
                }
                OutputFormat::Text => self.print_text_status(store.as_ref(), &targets).await?,
            }
        }
        Ok(())
    }
}

impl StatusCommand {
    async fn print_text_status(&self, logs: &dyn LogSink, targets: &[Target]) -> Result<()> {
        if targets.is_empty() {
            println!("没有任何监控目标，请先运行 'service-watch run'");
            return Ok(());
        }

        println!(
            "{:<20} {:<8} {:<10} {:<22} {:<14} {}",
            "标识", "状态", "间隔", "最后检测", "最近结果", "URL"
        );
        println!("{}", "-".repeat(100));

        for target in targets {
            let latest = logs.records(&target.id).await?.pop();
            let last_checked = target
                .last_checked
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "从未".to_string());
            let latest_code = latest
                .map(|record| record.code.to_string())
                .unwrap_or_else(|| "-".to_string());

            println!(
                "{:<20} {:<8} {:<10} {:<22} {:<14} {}",
                truncate_string(target.id.as_str(), 20),
                target.status,
                format!("{}s", target.interval_seconds),
                last_checked,
                latest_code,
                target.url
            );
        }

        Ok(())
    }
}

/// 历史命令
pub struct LogsCommand;

#[async_trait]
impl Command for LogsCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Logs { id, limit, format } = &args.command {
            let config_path = args.get_config_path();
            let config = load_config(&config_path).await?;
            let store = open_store(&config_path, &config).await?;

            let id = TargetId::new(id.clone());
            if store.find_by_id(&id).await?.is_none() {
                return Err(anyhow::anyhow!("未找到目标: {}", id));
            }

            let records = tail(store.records(&id).await?, *limit);
            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&records)?);
                }
                OutputFormat::Text => print_records(&id, &records),
            }
        }
        Ok(())
    }
}

/// 保留最近的 limit 条记录
fn tail(mut records: Vec<LogRecord>, limit: Option<usize>) -> Vec<LogRecord> {
    if let Some(limit) = limit {
        if records.len() > limit {
            records.drain(..records.len() - limit);
        }
    }
    records
}

fn print_records(id: &TargetId, records: &[LogRecord]) {
    if records.is_empty() {
        println!("目标 {} 暂无检测记录", id);
        return;
    }

    for record in records {
        println!(
            "{} {} {:<8} {:<14} {}ms {}",
            record.metadata.timestamp.format("%Y-%m-%d %H:%M:%S"),
            record.method,
            record.classification,
            record.code.to_string(),
            record.metadata.elapsed_ms,
            record.message
        );
    }
}

/// 验证命令
pub struct ValidateCommand;

#[async_trait]
impl Command for ValidateCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Validate { config_path } = &args.command {
            let config_file = config_path
                .clone()
                .unwrap_or_else(|| args.get_config_path());

            println!("验证配置文件: {}", config_file.display());
            let config = load_config(&config_file).await?;

            println!("✓ 配置文件验证通过");
            println!("✓ 找到 {} 个监控目标", config.targets.len());
            for target in &config.targets {
                println!(
                    "  - {} ({}) {} {} 每{}秒",
                    target.id, target.name, target.method, target.url, target.interval_seconds
                );
            }
        }
        Ok(())
    }
}

/// 初始化命令
pub struct InitCommand;

#[async_trait]
impl Command for InitCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Init { config_path, force } = &args.command {
            self.create_config_file(config_path, *force).await
        } else {
            Ok(())
        }
    }
}

impl InitCommand {
    /// 创建配置文件
    async fn create_config_file(&self, config_path: &Path, force: bool) -> Result<()> {
        if config_path.exists() && !force {
            eprintln!("配置文件已存在: {}", config_path.display());
            eprintln!("使用 --force 参数覆盖现有文件");
            return Ok(());
        }

        if let Some(parent) = config_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        tokio::fs::write(config_path, default_config_template())
            .await
            .with_context(|| format!("写入配置文件失败: {}", config_path.display()))?;

        println!("配置文件已创建: {}", config_path.display());
        println!("请编辑配置文件以添加您的监控目标");

        Ok(())
    }
}

fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::{HttpMethod, ResponseCode};
    use clap::Parser;
    use tempfile::TempDir;

    fn record(elapsed_ms: u64) -> LogRecord {
        CheckOutcome::new(
            TargetId::new("api"),
            HttpMethod::Get,
            "https://example.test",
            ResponseCode::Http(200),
        )
        .with_elapsed_ms(elapsed_ms)
        .to_log_record()
    }

    #[test]
    fn test_resolve_data_file() {
        let global = GlobalConfig::default();
        assert_eq!(
            resolve_data_file(Path::new("/etc/watch/config.toml"), &global),
            PathBuf::from("/etc/watch/service-watch.json")
        );
        assert_eq!(
            resolve_data_file(Path::new("config.toml"), &global),
            PathBuf::from("service-watch.json")
        );

        let absolute = GlobalConfig {
            data_file: PathBuf::from("/var/lib/watch.json"),
            ..GlobalConfig::default()
        };
        assert_eq!(
            resolve_data_file(Path::new("/etc/watch/config.toml"), &absolute),
            PathBuf::from("/var/lib/watch.json")
        );
    }

    #[test]
    fn test_tail_keeps_newest() {
        let records: Vec<_> = (0..5).map(record).collect();

        let kept = tail(records.clone(), Some(2));
        let elapsed: Vec<_> = kept.iter().map(|r| r.metadata.elapsed_ms).collect();
        assert_eq!(elapsed, vec![3, 4]);

        assert_eq!(tail(records.clone(), None).len(), 5);
        assert_eq!(tail(records, Some(10)).len(), 5);
    }

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("short", 10), "short");
        assert_eq!(truncate_string("a-very-long-target-id", 10), "a-very-...");
    }

    #[test]
    fn test_build_executor_uses_timeout() {
        let global = GlobalConfig {
            request_timeout_seconds: 7,
            user_agent: Some("watch-agent/1.0".to_string()),
            ..GlobalConfig::default()
        };
        let executor = build_executor(&global).unwrap();
        assert_eq!(executor.timeout(), Duration::from_secs(7));
    }

    #[tokio::test]
    async fn test_init_respects_force() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        InitCommand.create_config_file(&path, false).await.unwrap();
        let written = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(written, default_config_template());

        // 已存在时不覆盖
        tokio::fs::write(&path, "# custom").await.unwrap();
        InitCommand.create_config_file(&path, false).await.unwrap();
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "# custom");

        InitCommand.create_config_file(&path, true).await.unwrap();
        assert_eq!(
            tokio::fs::read_to_string(&path).await.unwrap(),
            default_config_template()
        );
    }

    #[tokio::test]
    async fn test_load_config_missing_file_hints_init() {
        let dir = TempDir::new().unwrap();
        let err = load_config(&dir.path().join("absent.toml"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("service-watch init"));
    }

    #[test]
    fn test_command_dispatch() {
        let args = Args::try_parse_from(["service-watch", "status"]).unwrap();
        let _command = command_for(&args);
    }
}

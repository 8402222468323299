//! 配置文件热重载
//!
//! 监听配置文件所在目录，文件变化后重新加载并广播新的目标目录。
//! 全局配置（超时、数据文件等）只在启动时生效，变化时事件中带上标记。

use crate::config::loader::{ConfigLoader, TomlConfigLoader};
use crate::config::types::{Config, GlobalConfig};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// 配置重载事件
#[derive(Debug, Clone)]
pub struct ConfigChangeEvent {
    /// 重载序号，从1开始
    pub version: u64,
    /// 重新加载并通过验证的配置
    pub config: Config,
    /// 全局配置是否与上一次不同
    pub global_changed: bool,
    /// 检测到变化的时间
    pub detected_at: DateTime<Utc>,
}

type NotifyEvents = mpsc::UnboundedReceiver<notify::Result<Event>>;

/// 配置文件监控器
pub struct ConfigWatcher {
    config_path: PathBuf,
    baseline: GlobalConfig,
    debounce: Duration,
    sender: broadcast::Sender<ConfigChangeEvent>,
    fs_watcher: Option<RecommendedWatcher>,
    reload_task: Option<JoinHandle<()>>,
}

impl ConfigWatcher {
    /// 创建监控器
    ///
    /// # 参数
    /// * `config_path` - 配置文件路径，必须是已存在的文件
    /// * `baseline` - 启动时生效的全局配置，用于判断全局配置是否变化
    /// * `debounce` - 合并连续写入事件的等待时间
    ///
    /// # 返回
    /// * `Result<(Self, broadcast::Receiver<ConfigChangeEvent>)>` - 监控器和事件接收器
    pub fn new<P: AsRef<Path>>(
        config_path: P,
        baseline: GlobalConfig,
        debounce: Duration,
    ) -> Result<(Self, broadcast::Receiver<ConfigChangeEvent>)> {
        let config_path = Self::resolve_path(config_path.as_ref())?;
        let (sender, receiver) = broadcast::channel(16);

        Ok((
            Self {
                config_path,
                baseline,
                debounce,
                sender,
                fs_watcher: None,
                reload_task: None,
            },
            receiver,
        ))
    }

    /// 解析为绝对路径（notify 上报的是绝对路径）
    fn resolve_path(path: &Path) -> Result<PathBuf> {
        let resolved = path
            .canonicalize()
            .with_context(|| format!("配置文件不存在: {}", path.display()))?;
        if !resolved.is_file() {
            anyhow::bail!("路径不是文件: {}", resolved.display());
        }
        Ok(resolved)
    }

    /// 开始监听；重复调用会先停止旧的监听
    pub fn start(&mut self) -> Result<()> {
        self.stop();

        let (tx, rx) = mpsc::unbounded_channel();
        let mut fs_watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = tx.send(res);
            },
            notify::Config::default(),
        )
        .context("创建文件监控器失败")?;

        // 编辑器常用"写临时文件再重命名"，因此监听所在目录
        let dir = self.config_path.parent().unwrap_or(&self.config_path);
        fs_watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("监控目录失败: {}", dir.display()))?;

        let reloader = Reloader {
            config_path: self.config_path.clone(),
            loader: TomlConfigLoader::new(true),
            last_global: self.baseline.clone(),
            version: 0,
        };
        let sender = self.sender.clone();
        let debounce = self.debounce;

        self.fs_watcher = Some(fs_watcher);
        self.reload_task = Some(tokio::spawn(reloader.run(rx, sender, debounce)));

        info!("开始监控配置文件: {}", self.config_path.display());
        Ok(())
    }

    /// 停止监听
    pub fn stop(&mut self) {
        if let Some(task) = self.reload_task.take() {
            task.abort();
        }
        if self.fs_watcher.take().is_some() {
            debug!("配置文件监控已停止: {}", self.config_path.display());
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// 订阅重载事件
    pub fn subscribe(&self) -> broadcast::Receiver<ConfigChangeEvent> {
        self.sender.subscribe()
    }
}

impl Drop for ConfigWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// 后台重载任务的状态
struct Reloader {
    config_path: PathBuf,
    loader: TomlConfigLoader,
    last_global: GlobalConfig,
    version: u64,
}

impl Reloader {
    async fn run(
        mut self,
        mut events: NotifyEvents,
        sender: broadcast::Sender<ConfigChangeEvent>,
        debounce: Duration,
    ) {
        while let Some(res) = events.recv().await {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    error!("文件监控事件错误: {}", e);
                    continue;
                }
            };
            if !touches(&event, &self.config_path) {
                continue;
            }

            // 等写入完成，并丢弃这段时间内的重复事件
            tokio::time::sleep(debounce).await;
            while events.try_recv().is_ok() {}

            match self.reload().await {
                Ok(change) => {
                    info!(
                        "配置已重新加载，版本: {}，目标数量: {}",
                        change.version,
                        change.config.targets.len()
                    );
                    if sender.send(change).is_err() {
                        debug!("没有配置变更订阅者");
                    }
                }
                Err(e) => error!("配置重载失败，继续使用当前配置: {:#}", e),
            }
        }
    }

    /// 加载并验证配置，成功后推进版本号
    async fn reload(&mut self) -> Result<ConfigChangeEvent> {
        let config = self
            .loader
            .load_from_file(&self.config_path)
            .await
            .with_context(|| format!("重新加载 {} 失败", self.config_path.display()))?;

        let global_changed = config.global != self.last_global;
        self.last_global = config.global.clone();
        self.version += 1;

        Ok(ConfigChangeEvent {
            version: self.version,
            config,
            global_changed,
            detected_at: Utc::now(),
        })
    }
}

/// 事件是否是对配置文件本身的创建或修改
fn touches(event: &Event, config_path: &Path) -> bool {
    matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
        && event.paths.iter().any(|path| path == config_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, ModifyKind, RemoveKind};
    use std::fs;
    use tempfile::TempDir;

    const ONE_TARGET: &str = r#"
[[targets]]
id = "api"
name = "API"
url = "https://example.com/health"
"#;

    fn event(kind: EventKind, path: &str) -> Event {
        Event::new(kind).add_path(PathBuf::from(path))
    }

    fn reloader(path: &Path) -> Reloader {
        Reloader {
            config_path: path.to_path_buf(),
            loader: TomlConfigLoader::new(false),
            last_global: GlobalConfig::default(),
            version: 0,
        }
    }

    #[tokio::test]
    async fn test_new_resolves_absolute_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, ONE_TARGET).unwrap();

        let (watcher, _rx) =
            ConfigWatcher::new(&path, GlobalConfig::default(), Duration::from_millis(50)).unwrap();
        assert!(watcher.config_path().is_absolute());
    }

    #[test]
    fn test_new_rejects_missing_file_and_directory() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.toml");

        assert!(ConfigWatcher::new(&missing, GlobalConfig::default(), Duration::ZERO).is_err());
        assert!(ConfigWatcher::new(dir.path(), GlobalConfig::default(), Duration::ZERO).is_err());
    }

    #[test]
    fn test_touches_only_config_file_writes() {
        let path = Path::new("/etc/watch/config.toml");

        assert!(touches(
            &event(EventKind::Modify(ModifyKind::Any), "/etc/watch/config.toml"),
            path
        ));
        assert!(touches(
            &event(EventKind::Create(CreateKind::File), "/etc/watch/config.toml"),
            path
        ));
        assert!(!touches(
            &event(EventKind::Modify(ModifyKind::Any), "/etc/watch/other.toml"),
            path
        ));
        assert!(!touches(
            &event(EventKind::Remove(RemoveKind::File), "/etc/watch/config.toml"),
            path
        ));
    }

    #[tokio::test]
    async fn test_reload_versions_and_global_change() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, ONE_TARGET).unwrap();

        let mut reloader = reloader(&path);
        let first = reloader.reload().await.unwrap();
        assert_eq!(first.version, 1);
        assert_eq!(first.config.targets.len(), 1);
        assert!(!first.global_changed);

        fs::write(
            &path,
            format!("[global]\nrequest_timeout_seconds = 10\n{ONE_TARGET}"),
        )
        .unwrap();
        let second = reloader.reload().await.unwrap();
        assert_eq!(second.version, 2);
        assert!(second.global_changed);
    }

    #[tokio::test]
    async fn test_invalid_reload_keeps_version() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[[targets]]\nid = \"broken\"").unwrap();

        let mut reloader = reloader(&path);
        assert!(reloader.reload().await.is_err());
        assert_eq!(reloader.version, 0);
    }
}

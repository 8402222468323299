//! 目标目录同步
//!
//! 把配置文件声明的目标列表与仓库中的目标对齐，并通知监控注册表。
//! 移除目标时先停止调度，再删除目标和历史记录。

use crate::config::TargetConfig;
use crate::error::StorageError;
use crate::monitor::registry::MonitorRegistry;
use crate::monitor::target::{Target, TargetId, TargetUpdate};
use crate::storage::{LogSink, TargetRepository};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, error, info};

/// 目录差异
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogDiff {
    /// 新增目标
    Added(Target),
    /// 检测参数变化
    Modified { old: Box<Target>, new: Box<Target> },
    /// 目标移除
    Removed(TargetId),
}

/// 一次同步的统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub added: usize,
    pub modified: usize,
    pub removed: usize,
    pub unchanged: usize,
    pub failed: usize,
}

impl SyncReport {
    /// 是否有任何变化
    pub fn has_changes(&self) -> bool {
        self.added + self.modified + self.removed > 0
    }
}

/// 计算仓库现状与期望目录之间的差异
///
/// # 参数
/// * `current` - 仓库中的目标
/// * `desired` - 配置声明的目标
///
/// # 返回
/// * `(Vec<CatalogDiff>, usize)` - 差异列表和未变化的目标数
pub fn diff_catalog(current: &[Target], desired: &[Target]) -> (Vec<CatalogDiff>, usize) {
    let current_map: HashMap<&TargetId, &Target> = current.iter().map(|t| (&t.id, t)).collect();
    let desired_map: BTreeMap<&TargetId, &Target> = desired.iter().map(|t| (&t.id, t)).collect();

    let mut diffs = Vec::new();
    let mut unchanged = 0;

    for (id, new_target) in &desired_map {
        match current_map.get(id) {
            Some(old_target) => {
                if old_target.check_params_differ(new_target) {
                    diffs.push(CatalogDiff::Modified {
                        old: Box::new((*old_target).clone()),
                        new: Box::new((*new_target).clone()),
                    });
                } else {
                    unchanged += 1;
                }
            }
            None => diffs.push(CatalogDiff::Added((*new_target).clone())),
        }
    }

    let mut removed: Vec<&TargetId> = current_map
        .keys()
        .filter(|id| !desired_map.contains_key(*id))
        .copied()
        .collect();
    removed.sort();
    diffs.extend(removed.into_iter().cloned().map(CatalogDiff::Removed));

    (diffs, unchanged)
}

/// 目录同步器
pub struct TargetSync {
    repository: Arc<dyn TargetRepository>,
    logs: Arc<dyn LogSink>,
    registry: Arc<MonitorRegistry>,
}

impl TargetSync {
    pub fn new(
        repository: Arc<dyn TargetRepository>,
        logs: Arc<dyn LogSink>,
        registry: Arc<MonitorRegistry>,
    ) -> Self {
        Self {
            repository,
            logs,
            registry,
        }
    }

    /// 应用新的目标目录
    ///
    /// 注册表尚未初始化时只更新仓库，初始化时会统一布置定时器。
    /// 单个目标的失败只记录日志并计入 `failed`，不影响其他目标。
    ///
    /// # 返回
    /// * `Result<SyncReport, StorageError>` - 同步统计；读取现有目标失败时返回错误
    pub async fn apply(&self, entries: &[TargetConfig]) -> Result<SyncReport, StorageError> {
        let desired: Vec<Target> = entries.iter().map(TargetConfig::to_target).collect();
        let current = self.repository.find_all().await?;
        let (diffs, unchanged) = diff_catalog(&current, &desired);
        let live = self.registry.is_initialized().await;

        let mut report = SyncReport {
            unchanged,
            ..Default::default()
        };

        for diff in diffs {
            let id = match &diff {
                CatalogDiff::Added(target) => target.id.clone(),
                CatalogDiff::Modified { new, .. } => new.id.clone(),
                CatalogDiff::Removed(id) => id.clone(),
            };

            match self.apply_diff(diff, live, &mut report).await {
                Ok(()) => {}
                Err(e) => {
                    error!(target_id = %id, "同步目标失败: {}", e);
                    report.failed += 1;
                }
            }
        }

        if report.has_changes() || report.failed > 0 {
            info!(
                "目标同步完成: 新增 {}，修改 {}，移除 {}，未变化 {}，失败 {}",
                report.added, report.modified, report.removed, report.unchanged, report.failed
            );
        } else {
            debug!("目标目录无变化");
        }

        Ok(report)
    }

    async fn apply_diff(
        &self,
        diff: CatalogDiff,
        live: bool,
        report: &mut SyncReport,
    ) -> Result<(), StorageError> {
        match diff {
            CatalogDiff::Added(target) => {
                let id = target.id.clone();
                self.repository.insert(target).await?;
                if live {
                    self.registry.register(&id).await?;
                }
                info!(target_id = %id, "新增监控目标");
                report.added += 1;
            }
            CatalogDiff::Modified { new, .. } => {
                self.repository
                    .update(&new.id, TargetUpdate::check_params(&new))
                    .await?;
                if live {
                    self.registry.update(&new.id).await?;
                }
                info!(target_id = %new.id, "监控目标配置已更新");
                report.modified += 1;
            }
            CatalogDiff::Removed(id) => {
                self.registry.remove(&id).await;
                self.repository.delete(&id).await?;
                self.logs.delete_records(&id).await?;
                info!(target_id = %id, "移除监控目标");
                report.removed += 1;
            }
        }
        Ok(())
    }
}

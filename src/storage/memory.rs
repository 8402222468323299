//! 内存存储实现
//!
//! 同时实现目标仓库和日志写入接口，用于测试和一次性检测

use crate::error::StorageError;
use crate::monitor::outcome::LogRecord;
use crate::monitor::target::{Target, TargetId, TargetUpdate};
use crate::storage::history::{BoundedHistory, DEFAULT_MAX_LOG_RECORDS};
use crate::storage::{LogSink, StorageResult, TargetRepository};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// 存储状态，内存存储与文件存储共用
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct StoreState {
    #[serde(default)]
    pub targets: BTreeMap<TargetId, Target>,
    #[serde(default)]
    pub logs: BTreeMap<TargetId, BoundedHistory>,
}

impl StoreState {
    pub fn find(&self, id: &TargetId) -> Option<Target> {
        self.targets.get(id).cloned()
    }

    pub fn all(&self) -> Vec<Target> {
        self.targets.values().cloned().collect()
    }

    pub fn update(&mut self, id: &TargetId, update: TargetUpdate) -> StorageResult<Target> {
        let target = self
            .targets
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound { id: id.to_string() })?;
        update.apply_to(target);
        Ok(target.clone())
    }

    pub fn insert(&mut self, target: Target) -> StorageResult<()> {
        if self.targets.contains_key(&target.id) {
            return Err(StorageError::AlreadyExists {
                id: target.id.to_string(),
            });
        }
        self.targets.insert(target.id.clone(), target);
        Ok(())
    }

    pub fn delete(&mut self, id: &TargetId) -> bool {
        self.logs.remove(id);
        self.targets.remove(id).is_some()
    }

    /// 追加历史记录；目标已被删除时拒绝写入，避免留下孤立历史
    pub fn append(
        &mut self,
        id: &TargetId,
        record: LogRecord,
        max_len: usize,
    ) -> StorageResult<()> {
        if !self.targets.contains_key(id) {
            return Err(StorageError::NotFound { id: id.to_string() });
        }
        self.logs
            .entry(id.clone())
            .or_default()
            .push(record, max_len);
        Ok(())
    }

    pub fn records(&self, id: &TargetId) -> Vec<LogRecord> {
        self.logs.get(id).map(BoundedHistory::to_vec).unwrap_or_default()
    }

    /// 按新的最大长度截断全部历史
    pub fn truncate_all(&mut self, max_len: usize) {
        for history in self.logs.values_mut() {
            history.truncate_to(max_len);
        }
    }
}

/// 内存存储
#[derive(Debug)]
pub struct MemoryStore {
    state: RwLock<StoreState>,
    max_log_records: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LOG_RECORDS)
    }
}

impl MemoryStore {
    /// 创建内存存储
    ///
    /// # 参数
    /// * `max_log_records` - 每个目标保留的历史记录数
    pub fn new(max_log_records: usize) -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            max_log_records: max_log_records.max(1),
        }
    }

    /// 使用一组初始目标创建内存存储（重复标识以后者为准）
    pub fn with_targets(targets: Vec<Target>, max_log_records: usize) -> Self {
        let mut state = StoreState::default();
        for target in targets {
            state.targets.insert(target.id.clone(), target);
        }
        Self {
            state: RwLock::new(state),
            max_log_records: max_log_records.max(1),
        }
    }

    pub fn max_log_records(&self) -> usize {
        self.max_log_records
    }
}

#[async_trait]
impl TargetRepository for MemoryStore {
    async fn find_by_id(&self, id: &TargetId) -> StorageResult<Option<Target>> {
        Ok(self.state.read().await.find(id))
    }

    async fn find_all(&self) -> StorageResult<Vec<Target>> {
        Ok(self.state.read().await.all())
    }

    async fn update(&self, id: &TargetId, update: TargetUpdate) -> StorageResult<Target> {
        self.state.write().await.update(id, update)
    }

    async fn insert(&self, target: Target) -> StorageResult<()> {
        self.state.write().await.insert(target)
    }

    async fn delete(&self, id: &TargetId) -> StorageResult<bool> {
        Ok(self.state.write().await.delete(id))
    }
}

#[async_trait]
impl LogSink for MemoryStore {
    async fn append_record(&self, id: &TargetId, record: LogRecord) -> StorageResult<()> {
        self.state
            .write()
            .await
            .append(id, record, self.max_log_records)
    }

    async fn records(&self, id: &TargetId) -> StorageResult<Vec<LogRecord>> {
        Ok(self.state.read().await.records(id))
    }

    async fn delete_records(&self, id: &TargetId) -> StorageResult<()> {
        self.state.write().await.logs.remove(id);
        Ok(())
    }
}

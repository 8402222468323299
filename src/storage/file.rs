//! JSON文件存储实现
//!
//! 每次修改后把完整状态写入JSON文件（先写临时文件再重命名），
//! 进程重启后目标状态、最后检测时间和历史记录都能恢复。

use crate::monitor::outcome::LogRecord;
use crate::monitor::target::{Target, TargetId, TargetUpdate};
use crate::storage::memory::StoreState;
use crate::storage::{LogSink, StorageResult, TargetRepository};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// JSON文件存储
///
/// 每次写操作都会复制完整状态并整体重写文件，写入期间持有状态锁。
/// 一次检测结果对应两次写入（状态更新和历史追加），适合目标数量和历史长度都较小的部署；
/// 规模更大时应换用支持增量写入的存储实现。
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    state: Mutex<StoreState>,
    max_log_records: usize,
}

impl JsonFileStore {
    /// 打开存储文件，文件不存在时从空状态开始
    ///
    /// # 参数
    /// * `path` - 存储文件路径
    /// * `max_log_records` - 每个目标保留的历史记录数
    ///
    /// # 返回
    /// * `StorageResult<Self>` - 存储实例
    pub async fn open<P: AsRef<Path>>(path: P, max_log_records: usize) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        let max_log_records = max_log_records.max(1);

        let mut state = if tokio::fs::try_exists(&path).await? {
            let content = tokio::fs::read_to_string(&path).await?;
            if content.trim().is_empty() {
                StoreState::default()
            } else {
                serde_json::from_str::<StoreState>(&content)?
            }
        } else {
            StoreState::default()
        };
        state.truncate_all(max_log_records);

        info!(
            "打开存储文件: {}，目标数量: {}",
            path.display(),
            state.targets.len()
        );

        Ok(Self {
            path,
            state: Mutex::new(state),
            max_log_records,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 在状态副本上执行修改，写盘成功后才提交
    async fn mutate<T, F>(&self, op: F) -> StorageResult<T>
    where
        F: FnOnce(&mut StoreState) -> StorageResult<T> + Send,
        T: Send,
    {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        let value = op(&mut next)?;
        self.persist(&next).await?;
        *state = next;
        Ok(value)
    }

    /// 写入存储文件
    async fn persist(&self, state: &StoreState) -> StorageResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let json_data = serde_json::to_vec_pretty(state)?;
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, json_data).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;

        debug!("存储文件已写入: {}", self.path.display());
        Ok(())
    }
}

#[async_trait]
impl TargetRepository for JsonFileStore {
    async fn find_by_id(&self, id: &TargetId) -> StorageResult<Option<Target>> {
        Ok(self.state.lock().await.find(id))
    }

    async fn find_all(&self) -> StorageResult<Vec<Target>> {
        Ok(self.state.lock().await.all())
    }

    async fn update(&self, id: &TargetId, update: TargetUpdate) -> StorageResult<Target> {
        self.mutate(|state| state.update(id, update)).await
    }

    async fn insert(&self, target: Target) -> StorageResult<()> {
        self.mutate(|state| state.insert(target)).await
    }

    async fn delete(&self, id: &TargetId) -> StorageResult<bool> {
        self.mutate(|state| Ok(state.delete(id))).await
    }
}

#[async_trait]
impl LogSink for JsonFileStore {
    async fn append_record(&self, id: &TargetId, record: LogRecord) -> StorageResult<()> {
        let max_len = self.max_log_records;
        self.mutate(|state| state.append(id, record, max_len)).await
    }

    async fn records(&self, id: &TargetId) -> StorageResult<Vec<LogRecord>> {
        Ok(self.state.lock().await.records(id))
    }

    async fn delete_records(&self, id: &TargetId) -> StorageResult<()> {
        self.mutate(|state| {
            state.logs.remove(id);
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::outcome::{CheckOutcome, ResponseCode};
    use crate::monitor::target::{HttpMethod, TargetStatus};
    use chrono::Utc;
    use tempfile::TempDir;

    fn target(id: &str) -> Target {
        Target::new(
            TargetId::new(id),
            id,
            "https://example.test/health",
            HttpMethod::Get,
            60,
        )
    }

    fn record(code: u16) -> LogRecord {
        CheckOutcome::new(
            TargetId::new("api"),
            HttpMethod::Get,
            "https://example.test/health",
            ResponseCode::Http(code),
        )
        .to_log_record()
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data").join("store.json");
        let id = TargetId::new("api");
        let now = Utc::now();

        {
            let store = JsonFileStore::open(&path, 10).await.unwrap();
            store.insert(target("api")).await.unwrap();
            store
                .update(&id, TargetUpdate::check_result(TargetStatus::Up, now))
                .await
                .unwrap();
            store.append_record(&id, record(200)).await.unwrap();
        }

        let reopened = JsonFileStore::open(&path, 10).await.unwrap();
        let found = reopened.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(found.status, TargetStatus::Up);
        assert_eq!(found.last_checked, Some(now));
        assert_eq!(reopened.records(&id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reopen_with_smaller_limit_truncates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        let id = TargetId::new("api");

        {
            let store = JsonFileStore::open(&path, 10).await.unwrap();
            store.insert(target("api")).await.unwrap();
            for code in [200, 500, 502, 200] {
                store.append_record(&id, record(code)).await.unwrap();
            }
        }

        let reopened = JsonFileStore::open(&path, 2).await.unwrap();
        let codes: Vec<_> = reopened
            .records(&id)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.code)
            .collect();
        assert_eq!(codes, vec![ResponseCode::Http(502), ResponseCode::Http(200)]);
    }

    #[tokio::test]
    async fn test_failed_mutation_not_committed() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::open(dir.path().join("store.json"), 10)
            .await
            .unwrap();

        let err = store
            .update(
                &TargetId::new("missing"),
                TargetUpdate::check_result(TargetStatus::Down, Utc::now()),
            )
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(store.find_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_removes_history() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::open(dir.path().join("store.json"), 10)
            .await
            .unwrap();
        let id = TargetId::new("api");

        store.insert(target("api")).await.unwrap();
        store.append_record(&id, record(200)).await.unwrap();
        assert!(store.delete(&id).await.unwrap());

        assert!(store.find_by_id(&id).await.unwrap().is_none());
        assert!(store.records(&id).await.unwrap().is_empty());
    }
}

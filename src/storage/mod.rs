//! 存储模块
//!
//! 定义调度核心依赖的两个协作接口（目标仓库与日志写入），以及内存和JSON文件两种实现

pub mod file;
pub mod history;
pub mod memory;

use crate::error::StorageError;
use crate::monitor::outcome::LogRecord;
use crate::monitor::target::{Target, TargetId, TargetUpdate};
use async_trait::async_trait;

// 重新导出主要类型
pub use file::JsonFileStore;
pub use history::{BoundedHistory, DEFAULT_MAX_LOG_RECORDS};
pub use memory::MemoryStore;

/// 存储操作结果
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// 监控目标仓库
#[async_trait]
pub trait TargetRepository: Send + Sync {
    /// 按标识查找目标，不存在时返回 `Ok(None)`
    async fn find_by_id(&self, id: &TargetId) -> StorageResult<Option<Target>>;

    /// 读取全部目标
    async fn find_all(&self) -> StorageResult<Vec<Target>>;

    /// 部分字段更新，返回更新后的目标；目标不存在时返回 `NotFound`
    async fn update(&self, id: &TargetId, update: TargetUpdate) -> StorageResult<Target>;

    /// 新增目标；标识已存在时返回 `AlreadyExists`
    async fn insert(&self, target: Target) -> StorageResult<()>;

    /// 删除目标及其历史记录，返回目标是否存在过
    async fn delete(&self, id: &TargetId) -> StorageResult<bool>;
}

/// 检测历史写入端
#[async_trait]
pub trait LogSink: Send + Sync {
    /// 追加一条记录，并在同一操作中截断到最大长度
    async fn append_record(&self, id: &TargetId, record: LogRecord) -> StorageResult<()>;

    /// 读取历史记录（从旧到新）
    async fn records(&self, id: &TargetId) -> StorageResult<Vec<LogRecord>>;

    /// 删除某个目标的全部历史记录
    async fn delete_records(&self, id: &TargetId) -> StorageResult<()>;
}

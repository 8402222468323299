//! 监控注册表
//!
//! 调度核心对外的唯一入口。注册、更新、移除三个操作互相串行，
//! 保证同一目标的定时器变更不会交错执行。

use crate::error::StorageError;
use crate::monitor::checker::CheckExecutor;
use crate::monitor::recorder::OutcomeRecorder;
use crate::monitor::scheduler::{SchedulerCore, TimerState};
use crate::monitor::target::TargetId;
use crate::storage::{LogSink, TargetRepository};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// 监控注册表
pub struct MonitorRegistry {
    scheduler: SchedulerCore,
    repository: Arc<dyn TargetRepository>,
    /// 串行化注册、更新、移除
    ops: Mutex<()>,
}

impl MonitorRegistry {
    /// 创建注册表
    ///
    /// # 参数
    /// * `repository` - 目标仓库
    /// * `logs` - 检测历史写入端
    /// * `executor` - 检测执行器
    pub fn new(
        repository: Arc<dyn TargetRepository>,
        logs: Arc<dyn LogSink>,
        executor: Arc<dyn CheckExecutor>,
    ) -> Self {
        let recorder = OutcomeRecorder::new(Arc::clone(&repository), logs);
        let scheduler = SchedulerCore::new(Arc::clone(&repository), executor, recorder);

        Self {
            scheduler,
            repository,
            ops: Mutex::new(()),
        }
    }

    /// 加载全部目标并开始调度
    pub async fn initialize(&self) -> Result<usize, StorageError> {
        let _guard = self.ops.lock().await;
        self.scheduler.initialize().await
    }

    /// 注册目标：读取最新配置，替换旧定时器
    ///
    /// 目标不存在时只记录日志，不视为错误。
    ///
    /// # 返回
    /// * `Result<bool, StorageError>` - 是否布置了定时器
    pub async fn register(&self, id: &TargetId) -> Result<bool, StorageError> {
        let _guard = self.ops.lock().await;

        let Some(target) = self.repository.find_by_id(id).await? else {
            info!(target_id = %id, "目标不存在，跳过注册");
            return Ok(false);
        };

        self.scheduler.arm(&target).await;
        debug!(target_id = %id, interval = target.interval_seconds, "目标已注册");
        Ok(true)
    }

    /// 目标配置变更后重新注册
    pub async fn update(&self, id: &TargetId) -> Result<bool, StorageError> {
        self.register(id).await
    }

    /// 停止调度目标；目标未被调度时什么也不做
    ///
    /// 不删除持久化的目标和历史记录。
    pub async fn remove(&self, id: &TargetId) -> bool {
        let _guard = self.ops.lock().await;
        let removed = self.scheduler.disarm(id).await;
        if removed {
            debug!(target_id = %id, "目标已移出调度");
        }
        removed
    }

    /// 停止全部定时器，可重复调用
    pub async fn shutdown(&self) -> usize {
        let _guard = self.ops.lock().await;
        self.scheduler.shutdown().await
    }

    pub async fn timer_state(&self, id: &TargetId) -> Option<TimerState> {
        self.scheduler.timer_state(id).await
    }

    pub async fn armed_count(&self) -> usize {
        self.scheduler.armed_count().await
    }

    pub async fn armed_targets(&self) -> Vec<TargetId> {
        self.scheduler.armed_targets().await
    }

    pub async fn is_initialized(&self) -> bool {
        self.scheduler.is_initialized().await
    }
}

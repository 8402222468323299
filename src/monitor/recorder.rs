//! 检测结果记录器
//!
//! 把一次检测结果落到存储：更新目标状态与最后检测时间，并向有界历史追加一条记录。
//! 两次写入互相独立，一次失败不会阻止另一次。

use crate::error::StorageError;
use crate::monitor::outcome::CheckOutcome;
use crate::monitor::target::TargetUpdate;
use crate::storage::{LogSink, TargetRepository};
use std::sync::Arc;
use tracing::debug;

/// 检测结果记录器
#[derive(Clone)]
pub struct OutcomeRecorder {
    /// 目标仓库
    targets: Arc<dyn TargetRepository>,
    /// 历史记录写入端
    logs: Arc<dyn LogSink>,
}

impl OutcomeRecorder {
    /// 创建新的记录器
    pub fn new(targets: Arc<dyn TargetRepository>, logs: Arc<dyn LogSink>) -> Self {
        Self { targets, logs }
    }

    /// 记录一次检测结果
    ///
    /// # 参数
    /// * `outcome` - 检测结果
    ///
    /// # 返回
    /// * `Result<(), StorageError>` - 两次写入都成功时返回 Ok，否则返回第一个错误
    pub async fn record(&self, outcome: &CheckOutcome) -> Result<(), StorageError> {
        let status = outcome.classification.target_status();

        let status_result = self
            .targets
            .update(
                &outcome.target_id,
                TargetUpdate::check_result(status, outcome.checked_at),
            )
            .await
            .map(|_| ());

        let log_result = self
            .logs
            .append_record(&outcome.target_id, outcome.to_log_record())
            .await;

        debug!(
            target_id = %outcome.target_id,
            status = ?status,
            status_ok = status_result.is_ok(),
            log_ok = log_result.is_ok(),
            "检测结果已记录"
        );

        status_result.and(log_result)
    }
}

//! 有界检测历史
//!
//! 环形缓冲语义：超过最大长度时最旧的记录先被丢弃

use crate::monitor::outcome::LogRecord;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// 每个目标默认保留的历史记录数
pub const DEFAULT_MAX_LOG_RECORDS: usize = 100;

/// 单个目标的有界历史记录
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoundedHistory {
    records: VecDeque<LogRecord>,
}

impl BoundedHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加记录并截断，返回被丢弃的记录数
    pub fn push(&mut self, record: LogRecord, max_len: usize) -> usize {
        self.records.push_back(record);
        self.truncate_to(max_len)
    }

    /// 截断到最大长度，返回被丢弃的记录数
    pub fn truncate_to(&mut self, max_len: usize) -> usize {
        let max_len = max_len.max(1);
        let mut dropped = 0;
        while self.records.len() > max_len {
            self.records.pop_front();
            dropped += 1;
        }
        dropped
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 最新的一条记录
    pub fn latest(&self) -> Option<&LogRecord> {
        self.records.back()
    }

    /// 按从旧到新的顺序复制全部记录
    pub fn to_vec(&self) -> Vec<LogRecord> {
        self.records.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::outcome::{CheckOutcome, ResponseCode};
    use crate::monitor::target::{HttpMethod, TargetId};

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
    fn test_push_within_limit() {
        let mut history = BoundedHistory::new();
        assert_eq!(history.push(record(1), 3), 0);
        assert_eq!(history.push(record(2), 3), 0);
        assert_eq!(history.len(), 2);
        assert_eq!(history.latest().unwrap().metadata.elapsed_ms, 2);
    }

    #[test]
    fn test_oldest_dropped_first() {
        let mut history = BoundedHistory::new();
        for i in 0..10 {
            history.push(record(i), 4);
        }

        assert_eq!(history.len(), 4);
        let elapsed: Vec<u64> = history
            .to_vec()
            .iter()
            .map(|r| r.metadata.elapsed_ms)
            .collect();
        assert_eq!(elapsed, vec![6, 7, 8, 9]);
    }

    #[test]
    fn test_truncate_after_limit_shrinks() {
        let mut history = BoundedHistory::new();
        for i in 0..5 {
            history.push(record(i), 10);
        }
        assert_eq!(history.truncate_to(2), 3);
        assert_eq!(history.to_vec()[0].metadata.elapsed_ms, 3);
    }

    #[test]
    fn test_zero_limit_keeps_latest() {
        let mut history = BoundedHistory::new();
        history.push(record(1), 0);
        history.push(record(2), 0);
        assert_eq!(history.len(), 1);
        assert_eq!(history.latest().unwrap().metadata.elapsed_ms, 2);
    }
}

//! 集成测试共用的检测执行器和仓库替身

#![allow(dead_code)]

use async_trait::async_trait;
use service_watch::error::StorageError;
use service_watch::monitor::{CheckExecutor, CheckOutcome, ResponseCode, TargetDescriptor};
use service_watch::monitor::{HttpMethod, Target, TargetId, TargetUpdate};
use service_watch::storage::{MemoryStore, StorageResult, TargetRepository};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 记录调用次数的检测执行器，返回固定的响应状态
pub struct CountingExecutor {
    calls: Mutex<Vec<TargetId>>,
    urls: Mutex<Vec<String>>,
    code: Mutex<ResponseCode>,
    latency: Duration,
}

impl CountingExecutor {
    pub fn new() -> Self {
        Self::with_latency(Duration::ZERO)
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            urls: Mutex::new(Vec::new()),
            code: Mutex::new(ResponseCode::Http(200)),
            latency,
        }
    }

    pub fn set_code(&self, code: ResponseCode) {
        *self.code.lock().unwrap() = code;
    }

    pub fn calls_for(&self, id: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|called| called.as_str() == id)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// 按调用顺序返回检测过的地址
    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CheckExecutor for CountingExecutor {
    async fn execute(&self, target: &TargetDescriptor) -> CheckOutcome {
        self.calls.lock().unwrap().push(target.id.clone());
        self.urls.lock().unwrap().push(target.url.clone());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let code = *self.code.lock().unwrap();
        CheckOutcome::new(target.id.clone(), target.method, target.url.clone(), code)
    }
}

/// 可以按需让读写失败的仓库
pub struct FlakyRepository {
    pub inner: Arc<MemoryStore>,
    pub fail_updates: AtomicBool,
    pub fail_reads: AtomicBool,
    pub fail_find_all: AtomicBool,
    /// 下一次 `find_by_id` 读到结果后再等待这么久才返回
    pub slow_next_read: Mutex<Option<Duration>>,
}

impl FlakyRepository {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            fail_updates: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
            fail_find_all: AtomicBool::new(false),
            slow_next_read: Mutex::new(None),
        }
    }

    fn unavailable() -> StorageError {
        StorageError::Unavailable("数据库连接断开".to_string())
    }
}

#[async_trait]
impl TargetRepository for FlakyRepository {
    async fn find_by_id(&self, id: &TargetId) -> StorageResult<Option<Target>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        let found = self.inner.find_by_id(id).await;
        let delay = self.slow_next_read.lock().unwrap().take();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        found
    }

    async fn find_all(&self) -> StorageResult<Vec<Target>> {
        if self.fail_find_all.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        self.inner.find_all().await
    }

    async fn update(&self, id: &TargetId, update: TargetUpdate) -> StorageResult<Target> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        self.inner.update(id, update).await
    }

    async fn insert(&self, target: Target) -> StorageResult<()> {
        self.inner.insert(target).await
    }

    async fn delete(&self, id: &TargetId) -> StorageResult<bool> {
        self.inner.delete(id).await
    }
}

pub fn target(id: &str, interval_seconds: u64) -> Target {
    Target::new(
        TargetId::new(id),
        id,
        format!("https://{id}.example.test/health"),
        HttpMethod::Get,
        interval_seconds,
    )
}

/// 让出执行权，使到期的定时器任务运行
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

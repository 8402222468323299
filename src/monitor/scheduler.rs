//! 调度核心
//!
//! 为每个被监控目标维护唯一的定时器，驱动"检测 → 记录 → 重新调度"循环。
//!
//! 每个目标的定时器槽位是一个显式状态机：
//!
//! - `Waiting { due }`：定时器已布置，到期后进入检测
//! - `Checking { cancelled, stale }`：检测循环正在执行，结束后自行重新布置定时器；
//!   `stale` 表示检测期间目标配置被更新过，重新调度前必须再读一次
//! - 槽位不存在：目标未被调度（未注册或已移除）
//!
//! 所有槽位变更都在同一把互斥锁内完成，因此同一目标任意时刻最多只有一个有效定时器，
//! 同一目标的两个检测循环也不会并发执行。不同目标的检测循环各自运行在独立任务中，互不阻塞。

use crate::error::StorageError;
use crate::monitor::checker::CheckExecutor;
use crate::monitor::outcome::CheckOutcome;
use crate::monitor::recorder::OutcomeRecorder;
use crate::monitor::target::{Target, TargetDescriptor, TargetId};
use crate::storage::TargetRepository;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};

/// 连续持久化失败达到该次数后升级告警日志
pub const PERSISTENCE_FAILURE_ESCALATION: u32 = 5;

/// 计算距离下次检测的等待时间
///
/// 等待时间 = 检测间隔 − 距上次检测已过去的时间，最小为0。
/// 从未检测过的目标立即检测；上次检测时间在未来（时钟回拨）时等待完整间隔。
pub fn compute_delay(
    interval: Duration,
    last_checked: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Duration {
    let Some(last_checked) = last_checked else {
        return Duration::ZERO;
    };

    match now.signed_duration_since(last_checked).to_std() {
        Ok(elapsed) => interval.saturating_sub(elapsed),
        Err(_) => interval,
    }
}

/// 定时器状态快照（只读）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    /// 等待到期
    Waiting { due: DateTime<Utc> },
    /// 检测进行中
    Checking,
}

/// 槽位阶段
#[derive(Debug, Clone, Copy)]
enum SlotPhase {
    Waiting { due: DateTime<Utc> },
    Checking { cancelled: bool, stale: bool },
}

/// 单个目标的定时器槽位
#[derive(Debug)]
struct TimerSlot {
    /// 布置该定时器时分配的代号，用于识别过期的唤醒
    generation: u64,
    phase: SlotPhase,
    /// 定时器任务（检测循环在同一任务中执行）
    task: AbortHandle,
    /// 连续持久化失败次数
    persistence_failures: u32,
}

/// 调度核心
pub struct SchedulerCore {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    /// 目标仓库，重新调度前读取最新配置
    repository: Arc<dyn TargetRepository>,
    /// 检测执行器
    executor: Arc<dyn CheckExecutor>,
    /// 结果记录器
    recorder: OutcomeRecorder,
    /// 目标标识 → 定时器槽位
    slots: Mutex<HashMap<TargetId, TimerSlot>>,
    /// 是否已完成初始化
    initialized: Mutex<bool>,
    /// 定时器代号计数器
    next_generation: AtomicU64,
}

impl SchedulerCore {
    /// 创建调度核心
    ///
    /// # 参数
    /// * `repository` - 目标仓库
    /// * `executor` - 检测执行器
    /// * `recorder` - 结果记录器
    pub fn new(
        repository: Arc<dyn TargetRepository>,
        executor: Arc<dyn CheckExecutor>,
        recorder: OutcomeRecorder,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                repository,
                executor,
                recorder,
                slots: Mutex::new(HashMap::new()),
                initialized: Mutex::new(false),
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    /// 加载全部目标并为每个目标布置定时器
    ///
    /// 重复调用不会产生重复定时器，只记录警告。加载失败时直接返回错误，不做部分初始化。
    ///
    /// # 返回
    /// * `Result<usize, StorageError>` - 本次布置的定时器数量
    pub async fn initialize(&self) -> Result<usize, StorageError> {
        let mut initialized = self.inner.initialized.lock().await;
        if *initialized {
            warn!("调度器已初始化，忽略重复的初始化请求");
            return Ok(0);
        }

        let targets = self.inner.repository.find_all().await?;
        let count = targets.len();

        {
            let mut slots = self.inner.slots.lock().await;
            for target in &targets {
                self.inner.arm_locked(&mut slots, target.descriptor());
            }
        }

        *initialized = true;
        info!("调度器初始化完成，监控目标数量: {}", count);
        Ok(count)
    }

    /// 为目标布置定时器
    ///
    /// 已有等待中的定时器时先取消再布置；目标正在检测时不另起定时器，
    /// 由进行中的检测循环在重新调度时读取最新配置。
    pub async fn arm(&self, target: &Target) {
        let mut slots = self.inner.slots.lock().await;
        self.inner.arm_locked(&mut slots, target.descriptor());
    }

    /// 取消目标的定时器
    ///
    /// 目标未被调度时什么也不做。检测进行中的目标会在本轮结束后停止调度。
    ///
    /// # 返回
    /// * `bool` - 是否存在被取消的定时器
    pub async fn disarm(&self, id: &TargetId) -> bool {
        let mut slots = self.inner.slots.lock().await;
        match slots.get_mut(id) {
            Some(slot) => match slot.phase {
                SlotPhase::Waiting { .. } => {
                    slot.task.abort();
                    slots.remove(id);
                    debug!(target_id = %id, "已取消定时器");
                    true
                }
                SlotPhase::Checking { ref mut cancelled, .. } => {
                    *cancelled = true;
                    debug!(target_id = %id, "检测进行中，本轮结束后停止调度");
                    true
                }
            },
            None => false,
        }
    }

    /// 取消全部定时器并清空调度表，可重复调用
    ///
    /// # 返回
    /// * `usize` - 被取消的定时器数量
    pub async fn shutdown(&self) -> usize {
        let mut initialized = self.inner.initialized.lock().await;
        let mut slots = self.inner.slots.lock().await;

        let count = slots.len();
        for (id, slot) in slots.drain() {
            slot.task.abort();
            debug!(target_id = %id, "停止定时器");
        }
        *initialized = false;

        if count > 0 {
            info!("调度器已停止，取消定时器数量: {}", count);
        }
        count
    }

    /// 是否已初始化
    pub async fn is_initialized(&self) -> bool {
        *self.inner.initialized.lock().await
    }

    /// 目标的定时器状态
    pub async fn timer_state(&self, id: &TargetId) -> Option<TimerState> {
        let slots = self.inner.slots.lock().await;
        slots.get(id).map(|slot| match slot.phase {
            SlotPhase::Waiting { due } => TimerState::Waiting { due },
            SlotPhase::Checking { .. } => TimerState::Checking,
        })
    }

    /// 当前被调度的目标数量
    pub async fn armed_count(&self) -> usize {
        self.inner.slots.lock().await.len()
    }

    /// 当前被调度的目标标识（已排序）
    pub async fn armed_targets(&self) -> Vec<TargetId> {
        let slots = self.inner.slots.lock().await;
        let mut ids: Vec<TargetId> = slots.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl Drop for SchedulerCore {
    fn drop(&mut self) {
        // 定时器任务持有内部状态的引用，必须显式终止
        if let Ok(mut slots) = self.inner.slots.try_lock() {
            for (_, slot) in slots.drain() {
                slot.task.abort();
            }
        }
    }
}

impl SchedulerInner {
    /// 在持有调度表锁的情况下布置定时器
    fn arm_locked(self: &Arc<Self>, slots: &mut HashMap<TargetId, TimerSlot>, descriptor: TargetDescriptor) {
        let mut persistence_failures = 0;

        if let Some(slot) = slots.get_mut(&descriptor.id) {
            match slot.phase {
                SlotPhase::Checking {
                    ref mut cancelled,
                    ref mut stale,
                } => {
                    *cancelled = false;
                    *stale = true;
                    debug!(target_id = %descriptor.id, "检测进行中，配置将在本轮结束后生效");
                    return;
                }
                SlotPhase::Waiting { .. } => {
                    slot.task.abort();
                    persistence_failures = slot.persistence_failures;
                }
            }
        }

        let slot = self.spawn_timer(descriptor.clone(), persistence_failures);
        slots.insert(descriptor.id, slot);
    }

    /// 启动定时器任务
    fn spawn_timer(self: &Arc<Self>, descriptor: TargetDescriptor, persistence_failures: u32) -> TimerSlot {
        let now = Utc::now();
        let delay = compute_delay(descriptor.interval, descriptor.last_checked, now);
        let due = now + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        debug!(
            target_id = %descriptor.id,
            delay_ms = delay.as_millis() as u64,
            generation,
            "布置定时器"
        );

        let inner = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.run_cycle(descriptor, generation).await;
        });

        TimerSlot {
            generation,
            phase: SlotPhase::Waiting { due },
            task: handle.abort_handle(),
            persistence_failures,
        }
    }

    /// 执行一轮检测循环：检测 → 记录 → 重新调度
    async fn run_cycle(self: Arc<Self>, descriptor: TargetDescriptor, generation: u64) {
        if !self.begin_check(&descriptor.id, generation).await {
            debug!(target_id = %descriptor.id, generation, "定时器已失效，跳过本次检测");
            return;
        }

        let checked = AssertUnwindSafe(self.executor.execute(&descriptor))
            .catch_unwind()
            .await;

        let (checked_at, persisted) = match checked {
            Ok(outcome) => {
                log_outcome(&outcome);
                let persisted = self.record_outcome(&outcome).await;
                (outcome.checked_at, persisted)
            }
            Err(_) => {
                error!(target_id = %descriptor.id, "检测执行器异常终止，本轮结果丢弃");
                (Utc::now(), true)
            }
        };

        self.reschedule_after_check(descriptor, generation, checked_at, persisted)
            .await;
    }

    /// 把等待中的槽位切换为检测中；槽位已被替换或移除时返回 false
    async fn begin_check(&self, id: &TargetId, generation: u64) -> bool {
        let mut slots = self.slots.lock().await;
        match slots.get_mut(id) {
            Some(slot) if slot.generation == generation => match slot.phase {
                SlotPhase::Waiting { .. } => {
                    slot.phase = SlotPhase::Checking {
                        cancelled: false,
                        stale: false,
                    };
                    true
                }
                SlotPhase::Checking { .. } => false,
            },
            _ => false,
        }
    }

    /// 记录检测结果，失败只记日志
    ///
    /// # 返回
    /// * `bool` - 是否成功持久化
    async fn record_outcome(&self, outcome: &CheckOutcome) -> bool {
        let recorded = AssertUnwindSafe(self.recorder.record(outcome))
            .catch_unwind()
            .await;

        match recorded {
            Ok(Ok(())) => true,
            Ok(Err(e)) if e.is_not_found() => {
                debug!(target_id = %outcome.target_id, "目标已删除，检测结果未记录");
                true
            }
            Ok(Err(e)) => {
                error!(target_id = %outcome.target_id, "记录检测结果失败: {}", e);
                false
            }
            Err(_) => {
                error!(target_id = %outcome.target_id, "记录检测结果时异常终止");
                false
            }
        }
    }

    /// 重新读取目标配置并布置下一次定时器
    ///
    /// 读取与加锁之间目标可能被更新；此时槽位带有 `stale` 标记，丢弃本次读到的快照并重新读取。
    async fn reschedule_after_check(
        self: &Arc<Self>,
        last_known: TargetDescriptor,
        generation: u64,
        checked_at: DateTime<Utc>,
        persisted: bool,
    ) {
        let id = last_known.id.clone();

        loop {
            let mut next = match self.repository.find_by_id(&id).await {
                Ok(Some(target)) => target.descriptor(),
                Ok(None) => {
                    debug!(target_id = %id, "目标已不存在，停止调度");
                    self.release_slot(&id, generation).await;
                    return;
                }
                Err(e) => {
                    warn!(target_id = %id, "读取目标配置失败，沿用上次配置: {}", e);
                    last_known.clone()
                }
            };

            // 持久化失败时仓库里的检测时间是旧的，以本轮检测时间为准
            next.last_checked = match next.last_checked {
                Some(last) if last >= checked_at => Some(last),
                _ => Some(checked_at),
            };

            let mut slots = self.slots.lock().await;
            let Some(slot) = slots.get_mut(&id) else {
                return;
            };
            if slot.generation != generation {
                return;
            }

            let phase = slot.phase;
            match phase {
                SlotPhase::Checking {
                    cancelled: true, ..
                } => {
                    slots.remove(&id);
                    debug!(target_id = %id, "目标已移除，停止调度");
                    return;
                }
                SlotPhase::Checking { stale: true, .. } => {
                    slot.phase = SlotPhase::Checking {
                        cancelled: false,
                        stale: false,
                    };
                    debug!(target_id = %id, "检测期间配置已更新，重新读取");
                }
                SlotPhase::Checking { .. } => {
                    let failures = if persisted {
                        0
                    } else {
                        slot.persistence_failures + 1
                    };
                    if failures > 0 && failures % PERSISTENCE_FAILURE_ESCALATION == 0 {
                        error!(
                            target_id = %id,
                            consecutive_failures = failures,
                            "检测结果连续持久化失败，目标状态可能已过期"
                        );
                    }

                    let slot = self.spawn_timer(next, failures);
                    slots.insert(id, slot);
                    return;
                }
                SlotPhase::Waiting { .. } => return,
            }
        }
    }

    /// 释放仍属于本轮检测的槽位
    async fn release_slot(&self, id: &TargetId, generation: u64) {
        let mut slots = self.slots.lock().await;
        if slots
            .get(id)
            .is_some_and(|slot| slot.generation == generation)
        {
            slots.remove(id);
        }
    }
}

/// 记录检测结果日志
fn log_outcome(outcome: &CheckOutcome) {
    if outcome.classification.is_success() {
        debug!(
            target_id = %outcome.target_id,
            check_id = %outcome.check_id,
            code = %outcome.code,
            elapsed_ms = outcome.elapsed_ms,
            "服务检测正常"
        );
    } else {
        warn!(
            target_id = %outcome.target_id,
            check_id = %outcome.check_id,
            code = %outcome.code,
            elapsed_ms = outcome.elapsed_ms,
            "服务检测失败: {}",
            outcome.message
        );
    }
}

//! 监控模块
//!
//! 包含目标模型、HTTP检测执行器、结果记录器、调度核心以及对外的监控注册表

pub mod checker;
pub mod outcome;
pub mod recorder;
pub mod registry;
pub mod scheduler;
pub mod target;

// 重新导出主要类型
pub use checker::{CheckExecutor, HttpCheckExecutor, DEFAULT_CHECK_TIMEOUT};
pub use outcome::{CheckOutcome, Classification, LogMetadata, LogRecord, ResponseCode};
pub use recorder::OutcomeRecorder;
pub use registry::MonitorRegistry;
pub use scheduler::{compute_delay, SchedulerCore, TimerState, PERSISTENCE_FAILURE_ESCALATION};
pub use target::{
    HttpMethod, Target, TargetDescriptor, TargetId, TargetStatus, TargetUpdate,
    MAX_INTERVAL_SECONDS, MIN_INTERVAL_SECONDS,
};

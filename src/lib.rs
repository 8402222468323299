//! Service Watch - HTTP服务可用性监控工具
//!
//! 按目标各自的间隔周期性检测HTTP端点：
//! - 每个目标独立的定时器，任意时刻最多一个
//! - 检测结果写回目标状态，并保留有界的检测历史
//! - 配置文件声明目标目录，支持热重载
//! - 结构化日志记录

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod storage;
pub mod sync;

// 重新导出主要类型
pub use config::{Config, GlobalConfig, TargetConfig};
pub use error::MonitorError;
pub use monitor::{
    CheckExecutor, CheckOutcome, HttpCheckExecutor, MonitorRegistry, Target, TargetId,
    TargetStatus,
};
pub use storage::{JsonFileStore, LogSink, MemoryStore, TargetRepository};
pub use sync::TargetSync;

/// 应用程序版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 应用程序名称
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// 应用程序描述
pub const APP_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

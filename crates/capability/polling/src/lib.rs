//! # 轮询引擎
//!
//! - [`Scheduler`]：持有全部通道运行时，按通道周期驱动轮询，用信号量限制并发
//! - [`ChannelRuntime`]：单通道连接状态机（连接 → 读取 → 解码 → 发布）
//! - [`Backoff`]：连接失败后的指数退避
//! - [`StatusTracker`]：通道状态查询面
//!
//! 连接/读取错误只影响所在通道，不会使调度器退出。

mod backoff;
mod runtime;
mod scheduler;
mod status;

pub use backoff::Backoff;
pub use runtime::{ChannelRuntime, CycleOutcome, RuntimeOptions};
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerError};
pub use status::StatusTracker;

//! # EMS Storage 模块
//!
//! 快照存储抽象层。发布器只依赖 [`SnapshotStore`]：
//!
//! - [`RedisSnapshotStore`]：生产实现，每个快照一次 `HSET key f1 v1 f2 v2 ...`
//! - [`InMemorySnapshotStore`]：测试实现，支持注入写入失败与延迟
//!
//! ## 键格式
//!
//! `{prefix}:{channel_id}:{type_code}`，类型码为 `m`/`s`/`c`/`a`，见 [`snapshot_key`]。
//! 哈希字段为点位号（十进制）加上 `_timestamp`（epoch 秒）。
//!
//! ## 最后已知值
//!
//! 写入只覆盖本次携带的字段，从不删除键或字段；
//! 新快照缺少的点位保留上一次的值。

pub mod error;
pub mod in_memory;
pub mod keys;
pub mod redis;
pub mod traits;

pub use error::*;
pub use in_memory::InMemorySnapshotStore;
pub use keys::*;
pub use self::redis::RedisSnapshotStore;
pub use traits::*;

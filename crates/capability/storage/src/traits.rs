//! 存储接口 Trait 定义

use crate::error::StorageError;
use async_trait::async_trait;
use std::collections::HashMap;

/// 快照存储接口
///
/// `write_fields` 必须在一次原子操作中写入全部字段，且不删除未携带的字段。
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn write_fields(
        &self,
        key: &str,
        fields: &[(String, String)],
    ) -> Result<(), StorageError>;

    /// 读取哈希全部字段；键不存在时返回空表。
    async fn read_fields(&self, key: &str) -> Result<HashMap<String, String>, StorageError>;
}

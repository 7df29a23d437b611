//! 快照键的生成与解析。

use domain::{ChannelId, DataType};

/// 快照哈希中的时间戳字段（epoch 秒）。
pub const TIMESTAMP_FIELD: &str = "_timestamp";

/// 解析后的快照键
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotKey {
    pub prefix: String,
    pub channel_id: ChannelId,
    pub data_type: DataType,
}

pub fn snapshot_key(prefix: &str, channel_id: ChannelId, data_type: DataType) -> String {
    format!("{}:{}:{}", prefix, channel_id, data_type.type_code())
}

/// 从右侧切分，前缀本身可以包含 `:`。
pub fn parse_snapshot_key(key: &str) -> Option<SnapshotKey> {
    let mut parts = key.rsplitn(3, ':');
    let type_code = parts.next()?;
    let channel_id = parts.next()?;
    let prefix = parts.next()?;
    if prefix.is_empty() {
        return None;
    }
    Some(SnapshotKey {
        prefix: prefix.to_string(),
        channel_id: channel_id.parse().ok()?,
        data_type: DataType::from_type_code(type_code)?,
    })
}

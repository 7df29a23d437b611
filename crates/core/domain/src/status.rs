use crate::channel::{ChannelId, ChannelState, ProtocolKind};

/// 通道健康状态（派生数据，不参与轮询决策）。
///
/// `active_point_count` 只统计每种数据类型最近一次成功发布的快照点数之和。
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelStatus {
    pub channel_id: ChannelId,
    pub name: String,
    pub protocol: ProtocolKind,
    pub state: ChannelState,
    pub connected: bool,
    pub last_update_ms: Option<i64>,
    pub active_point_count: usize,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    pub decode_warnings: u64,
    pub publish_failures: u64,
    pub stale_points: usize,
}

impl ChannelStatus {
    pub fn new(channel_id: ChannelId, name: impl Into<String>, protocol: ProtocolKind) -> Self {
        Self {
            channel_id,
            name: name.into(),
            protocol,
            state: ChannelState::Disconnected,
            connected: false,
            last_update_ms: None,
            active_point_count: 0,
            last_error: None,
            consecutive_failures: 0,
            decode_warnings: 0,
            publish_failures: 0,
            stale_points: 0,
        }
    }
}

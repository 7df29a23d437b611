//! 通道状态跟踪。
//!
//! 由运行时状态转换和发布结果驱动，只供查询，不参与轮询决策。

use domain::{ChannelId, ChannelState, ChannelStatus, DataType, ProtocolKind};
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

struct Tracked {
    status: ChannelStatus,
    published_points: BTreeMap<DataType, usize>,
}

#[derive(Default)]
pub struct StatusTracker {
    channels: RwLock<BTreeMap<ChannelId, Tracked>>,
}

impl StatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<ChannelId, Tracked>> {
        self.channels.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<ChannelId, Tracked>> {
        self.channels.write().unwrap_or_else(|p| p.into_inner())
    }

    fn update(&self, channel_id: ChannelId, apply: impl FnOnce(&mut Tracked)) {
        if let Some(tracked) = self.write().get_mut(&channel_id) {
            apply(tracked);
        }
    }

    /// 登记通道；重复登记保留已有状态。
    pub fn register(&self, channel_id: ChannelId, name: &str, protocol: ProtocolKind) {
        self.write().entry(channel_id).or_insert_with(|| Tracked {
            status: ChannelStatus::new(channel_id, name, protocol),
            published_points: BTreeMap::new(),
        });
    }

    pub fn set_state(&self, channel_id: ChannelId, state: ChannelState) {
        self.update(channel_id, |tracked| {
            tracked.status.state = state;
            tracked.status.connected = state.is_connected();
            if state.is_connected() {
                tracked.status.consecutive_failures = 0;
            }
        });
    }

    /// 记录连接或读取失败：状态置为 Error。
    pub fn record_failure(&self, channel_id: ChannelId, error: impl Into<String>) {
        let error = error.into();
        self.update(channel_id, |tracked| {
            tracked.status.state = ChannelState::Error;
            tracked.status.connected = false;
            tracked.status.last_error = Some(error);
            tracked.status.consecutive_failures =
                tracked.status.consecutive_failures.saturating_add(1);
        });
    }

    /// 记录一次成功发布；该数据类型的点数以本次快照为准。
    pub fn record_published(
        &self,
        channel_id: ChannelId,
        data_type: DataType,
        point_count: usize,
        timestamp_ms: i64,
    ) {
        self.update(channel_id, |tracked| {
            tracked.published_points.insert(data_type, point_count);
            tracked.status.active_point_count = tracked.published_points.values().sum();
            tracked.status.last_update_ms = Some(timestamp_ms);
        });
    }

    pub fn record_publish_failure(&self, channel_id: ChannelId) {
        self.update(channel_id, |tracked| {
            tracked.status.publish_failures = tracked.status.publish_failures.saturating_add(1);
        });
    }

    pub fn record_decode_warnings(&self, channel_id: ChannelId, count: u64) {
        self.update(channel_id, |tracked| {
            tracked.status.decode_warnings = tracked.status.decode_warnings.saturating_add(count);
        });
    }

    pub fn set_stale_points(&self, channel_id: ChannelId, count: usize) {
        self.update(channel_id, |tracked| {
            tracked.status.stale_points = count;
        });
    }

    pub fn get_status(&self, channel_id: ChannelId) -> Option<ChannelStatus> {
        self.read()
            .get(&channel_id)
            .map(|tracked| tracked.status.clone())
    }

    /// 全部通道状态，按通道号升序。
    pub fn list_statuses(&self) -> Vec<ChannelStatus> {
        self.read()
            .values()
            .map(|tracked| tracked.status.clone())
            .collect()
    }
}

//! 通道运行时：单个通道的连接状态机与轮询周期。
//!
//! ```text
//! Disconnected ──► Connecting ──► Connected ──► Connected（下一周期）
//!                      ▲              │
//!                      │ 退避到期      ▼ 连接/读取失败
//!                      └────────── Error ──► Disconnected（停机）
//! ```
//!
//! 一个周期只有在全部规划读取都成功时才解码并发布，不发布残缺快照。

use crate::backoff::Backoff;
use crate::status::StatusTracker;
use domain::{
    Channel, ChannelId, ChannelState, PointId, PointMapping, RawUnitBuffer, UnitRange,
    now_epoch_ms,
};
use ems_decode::decode;
use ems_pipeline::Publisher;
use ems_protocol::{
    AdapterHandle, ConnectError, PlanLimits, ProtocolAdapter, ReadError, plan_reads,
};
use ems_telemetry::{
    record_connect_attempt, record_connect_failure, record_decode_warnings, record_poll_failed,
    record_poll_ok, record_read_failure,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// 单个周期的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// 读取成功并完成解码与发布
    Polled {
        published: usize,
        dropped: usize,
        points: usize,
        warnings: usize,
    },
    /// 仍在退避等待中，本周期未尝试连接
    BackingOff,
    ConnectFailed { retry_in: Duration },
    ReadFailed,
}

/// 运行时参数
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    /// 连续缺失多少个周期后视为陈旧；0 表示关闭
    pub stale_after_misses: u32,
    pub plan_limits: PlanLimits,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            backoff_base: Duration::from_millis(1000),
            backoff_max: Duration::from_millis(60_000),
            stale_after_misses: 0,
            plan_limits: PlanLimits::default(),
        }
    }
}

pub struct ChannelRuntime {
    channel: Channel,
    mappings: Vec<PointMapping>,
    ranges: Vec<UnitRange>,
    adapter: Arc<dyn ProtocolAdapter>,
    publisher: Arc<Publisher>,
    status: Arc<StatusTracker>,
    state: ChannelState,
    handle: Option<AdapterHandle>,
    backoff: Backoff,
    retry_at: Option<Instant>,
    stale_after_misses: u32,
    misses: BTreeMap<PointId, u32>,
}

impl ChannelRuntime {
    pub fn new(
        channel: Channel,
        mappings: Vec<PointMapping>,
        adapter: Arc<dyn ProtocolAdapter>,
        publisher: Arc<Publisher>,
        status: Arc<StatusTracker>,
        options: RuntimeOptions,
    ) -> Self {
        let ranges = plan_reads(&mappings, options.plan_limits);
        status.register(channel.id, &channel.name, channel.protocol());
        Self {
            channel,
            mappings,
            ranges,
            adapter,
            publisher,
            status,
            state: ChannelState::Disconnected,
            handle: None,
            backoff: Backoff::new(options.backoff_base, options.backoff_max),
            retry_at: None,
            stale_after_misses: options.stale_after_misses,
            misses: BTreeMap::new(),
        }
    }

    pub fn channel_id(&self) -> ChannelId {
        self.channel.id
    }

    pub fn poll_interval(&self) -> Duration {
        self.channel.poll_interval
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn planned_reads(&self) -> &[UnitRange] {
        &self.ranges
    }

    fn set_state(&mut self, state: ChannelState) {
        self.state = state;
        self.status.set_state(self.channel.id, state);
    }

    /// 执行一个完整的轮询周期：采集，然后解码并发布。
    pub async fn poll_once(&mut self) -> CycleOutcome {
        match self.acquire().await {
            Ok(buffer) => self.publish(&buffer).await,
            Err(outcome) => outcome,
        }
    }

    /// 采集阶段：必要时连接，然后按规划逐段读取。
    ///
    /// 只有这一阶段与现场会话有关；周期超时只应覆盖它。
    pub async fn acquire(&mut self) -> Result<RawUnitBuffer, CycleOutcome> {
        let handle = match self.handle {
            Some(handle) => handle,
            None => self.connect().await?,
        };

        let mut buffer = RawUnitBuffer::new();
        for range in self.ranges.clone() {
            let result = tokio::time::timeout(
                self.channel.read_timeout,
                self.adapter.read_units(handle, std::slice::from_ref(&range)),
            )
            .await
            .unwrap_or_else(|_| {
                Err(ReadError::Timeout(format!(
                    "read exceeded {} ms",
                    self.channel.read_timeout.as_millis()
                )))
            });
            match result {
                Ok(part) => buffer.merge(part),
                Err(err) => {
                    record_read_failure();
                    warn!(
                        target: "ems.polling",
                        channel_id = self.channel.id,
                        kind = ?range.kind,
                        start = range.start,
                        count = range.count,
                        error = %err,
                        "channel_read_failed"
                    );
                    self.fail_session(err.to_string()).await;
                    return Err(CycleOutcome::ReadFailed);
                }
            }
        }

        record_poll_ok();
        Ok(buffer)
    }

    async fn connect(&mut self) -> Result<AdapterHandle, CycleOutcome> {
        if let Some(retry_at) = self.retry_at {
            if Instant::now() < retry_at {
                return Err(CycleOutcome::BackingOff);
            }
        }

        self.set_state(ChannelState::Connecting);
        record_connect_attempt();
        let result = tokio::time::timeout(
            self.channel.connect_timeout,
            self.adapter.connect(&self.channel.params),
        )
        .await
        .unwrap_or_else(|_| {
            Err(ConnectError::Timeout(format!(
                "connect exceeded {} ms",
                self.channel.connect_timeout.as_millis()
            )))
        });

        match result {
            Ok(handle) => {
                self.handle = Some(handle);
                self.backoff.reset();
                self.retry_at = None;
                self.set_state(ChannelState::Connected);
                info!(
                    target: "ems.polling",
                    channel_id = self.channel.id,
                    adapter = self.adapter.name(),
                    handle = %handle,
                    "channel_connected"
                );
                Ok(handle)
            }
            Err(err) => {
                record_connect_failure();
                record_poll_failed();
                let retry_in = self.backoff.next_delay();
                self.retry_at = Some(Instant::now() + retry_in);
                self.state = ChannelState::Error;
                self.status.record_failure(self.channel.id, err.to_string());
                warn!(
                    target: "ems.polling",
                    channel_id = self.channel.id,
                    attempt = self.backoff.failures(),
                    retry_in_ms = retry_in.as_millis() as u64,
                    error = %err,
                    "channel_connect_failed"
                );
                Err(CycleOutcome::ConnectFailed { retry_in })
            }
        }
    }

    /// 发布阶段：解码并逐个发布快照。发布失败只计入状态，不影响会话。
    pub async fn publish(&mut self, buffer: &RawUnitBuffer) -> CycleOutcome {
        let outcome = decode(buffer, &self.mappings);
        let warnings = outcome.warnings.len();
        if warnings > 0 {
            record_decode_warnings(warnings as u64);
            self.status
                .record_decode_warnings(self.channel.id, warnings as u64);
            for warning in &outcome.warnings {
                debug!(
                    target: "ems.polling",
                    channel_id = self.channel.id,
                    point_id = warning.point_id(),
                    warning = %warning,
                    "decode_warning"
                );
            }
        }
        self.track_misses(&outcome);

        let timestamp_ms = now_epoch_ms();
        let mut published = 0;
        let mut dropped = 0;
        for snapshot in outcome.snapshots(self.channel.id, timestamp_ms) {
            match self.publisher.publish(&snapshot).await {
                Ok(_) => {
                    published += 1;
                    self.status.record_published(
                        self.channel.id,
                        snapshot.data_type,
                        snapshot.len(),
                        timestamp_ms,
                    );
                }
                Err(_) => {
                    dropped += 1;
                    self.status.record_publish_failure(self.channel.id);
                }
            }
        }

        CycleOutcome::Polled {
            published,
            dropped,
            points: outcome.point_count(),
            warnings,
        }
    }

    fn track_misses(&mut self, outcome: &ems_decode::DecodeOutcome) {
        if self.stale_after_misses == 0 {
            return;
        }
        let threshold = self.stale_after_misses;
        for mapping in &self.mappings {
            let decoded = outcome
                .values
                .get(&mapping.data_type)
                .is_some_and(|values| values.contains_key(&mapping.point_id));
            let misses = self.misses.entry(mapping.point_id).or_insert(0);
            *misses = if decoded { 0 } else { misses.saturating_add(1) };
        }
        let stale = self.misses.values().filter(|m| **m >= threshold).count();
        self.status.set_stale_points(self.channel.id, stale);
    }

    async fn close_session(&mut self) {
        if let Some(handle) = self.handle.take() {
            let timeout = self.channel.read_timeout;
            if tokio::time::timeout(timeout, self.adapter.close(handle))
                .await
                .is_err()
            {
                warn!(
                    target: "ems.polling",
                    channel_id = self.channel.id,
                    handle = %handle,
                    "channel_close_timed_out"
                );
            }
        }
    }

    async fn fail_session(&mut self, error: String) {
        record_poll_failed();
        self.close_session().await;
        self.state = ChannelState::Error;
        self.status.record_failure(self.channel.id, error);
    }

    /// 采集超时：按读取失败处理，关闭会话，下一周期重连。
    pub async fn on_poll_timeout(&mut self, timeout: Duration) {
        self.fail_session(format!("poll cycle exceeded {} ms", timeout.as_millis()))
            .await;
    }

    /// 停机：关闭会话，状态置为 Disconnected。
    pub async fn shutdown(&mut self) {
        self.close_session().await;
        self.set_state(ChannelState::Disconnected);
        info!(target: "ems.polling", channel_id = self.channel.id, "channel_stopped");
    }
}

//! 追踪、请求 ID 生成与轮询指标。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 请求级追踪标识。
#[derive(Debug, Clone)]
pub struct RequestIds {
    pub request_id: String,
    pub trace_id: String,
}

/// 指标快照。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub polls_ok: u64,
    pub polls_failed: u64,
    pub connect_attempts: u64,
    pub connect_failures: u64,
    pub read_failures: u64,
    pub poll_timeouts: u64,
    pub deferred_ticks: u64,
    pub decode_warnings: u64,
    pub snapshots_published: u64,
    pub snapshots_failed: u64,
    pub snapshots_dropped: u64,
    pub publish_latency_ms_total: u64,
    pub publish_latency_ms_count: u64,
}

/// 进程级计数器。
pub struct TelemetryMetrics {
    polls_ok: AtomicU64,
    polls_failed: AtomicU64,
    connect_attempts: AtomicU64,
    connect_failures: AtomicU64,
    read_failures: AtomicU64,
    poll_timeouts: AtomicU64,
    deferred_ticks: AtomicU64,
    decode_warnings: AtomicU64,
    snapshots_published: AtomicU64,
    snapshots_failed: AtomicU64,
    snapshots_dropped: AtomicU64,
    publish_latency_ms_total: AtomicU64,
    publish_latency_ms_count: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            polls_ok: AtomicU64::new(0),
            polls_failed: AtomicU64::new(0),
            connect_attempts: AtomicU64::new(0),
            connect_failures: AtomicU64::new(0),
            read_failures: AtomicU64::new(0),
            poll_timeouts: AtomicU64::new(0),
            deferred_ticks: AtomicU64::new(0),
            decode_warnings: AtomicU64::new(0),
            snapshots_published: AtomicU64::new(0),
            snapshots_failed: AtomicU64::new(0),
            snapshots_dropped: AtomicU64::new(0),
            publish_latency_ms_total: AtomicU64::new(0),
            publish_latency_ms_count: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            polls_ok: self.polls_ok.load(Ordering::Relaxed),
            polls_failed: self.polls_failed.load(Ordering::Relaxed),
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            read_failures: self.read_failures.load(Ordering::Relaxed),
            poll_timeouts: self.poll_timeouts.load(Ordering::Relaxed),
            deferred_ticks: self.deferred_ticks.load(Ordering::Relaxed),
            decode_warnings: self.decode_warnings.load(Ordering::Relaxed),
            snapshots_published: self.snapshots_published.load(Ordering::Relaxed),
            snapshots_failed: self.snapshots_failed.load(Ordering::Relaxed),
            snapshots_dropped: self.snapshots_dropped.load(Ordering::Relaxed),
            publish_latency_ms_total: self.publish_latency_ms_total.load(Ordering::Relaxed),
            publish_latency_ms_count: self.publish_latency_ms_count.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局指标实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 生成新的 request_id 与 trace_id。
pub fn new_request_ids() -> RequestIds {
    RequestIds {
        request_id: uuid::Uuid::new_v4().to_string(),
        trace_id: uuid::Uuid::new_v4().to_string(),
    }
}

/// 记录一次成功轮询（读取完成并进入解码）。
pub fn record_poll_ok() {
    metrics().polls_ok.fetch_add(1, Ordering::Relaxed);
}

pub fn record_poll_failed() {
    metrics().polls_failed.fetch_add(1, Ordering::Relaxed);
}

pub fn record_connect_attempt() {
    metrics().connect_attempts.fetch_add(1, Ordering::Relaxed);
}

pub fn record_connect_failure() {
    metrics().connect_failures.fetch_add(1, Ordering::Relaxed);
}

pub fn record_read_failure() {
    metrics().read_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录轮询超时（周期被强制结束并释放并发槽位）。
pub fn record_poll_timeout() {
    metrics().poll_timeouts.fetch_add(1, Ordering::Relaxed);
}

/// 记录因并发上限而等待的 tick。
pub fn record_deferred_tick() {
    metrics().deferred_ticks.fetch_add(1, Ordering::Relaxed);
}

pub fn record_decode_warnings(count: u64) {
    metrics().decode_warnings.fetch_add(count, Ordering::Relaxed);
}

pub fn record_snapshot_published() {
    metrics().snapshots_published.fetch_add(1, Ordering::Relaxed);
}

/// 记录单次写入失败（重试前）。
pub fn record_snapshot_failed() {
    metrics().snapshots_failed.fetch_add(1, Ordering::Relaxed);
}

/// 记录重试耗尽后丢弃的快照。
pub fn record_snapshot_dropped() {
    metrics().snapshots_dropped.fetch_add(1, Ordering::Relaxed);
}

/// 记录发布延迟（毫秒，包含重试）。
pub fn record_publish_latency_ms(latency_ms: u64) {
    let metrics = metrics();
    metrics
        .publish_latency_ms_total
        .fetch_add(latency_ms, Ordering::Relaxed);
    metrics
        .publish_latency_ms_count
        .fetch_add(1, Ordering::Relaxed);
}

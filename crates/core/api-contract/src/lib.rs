//! 稳定的 DTO 与 API 响应契约。

use serde::{Deserialize, Serialize};

/// 标准 API 响应封装。
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

/// 失败响应的错误体。
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                code: code.into(),
                message: message.into(),
            }),
        }
    }
}

/// 健康检查响应体。
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub channels: usize,
    pub connected_channels: usize,
}

/// 通道状态。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelStatusDto {
    pub channel_id: u32,
    pub name: String,
    pub protocol: String,
    pub state: String,
    pub connected: bool,
    pub last_update_ms: Option<i64>,
    pub active_point_count: usize,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    pub decode_warnings: u64,
    pub publish_failures: u64,
    pub stale_points: usize,
}

/// 进程级计数器快照。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsDto {
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
    /// 平均发布延迟（毫秒）；尚无样本时为 None
    pub publish_latency_ms_avg: Option<f64>,
}

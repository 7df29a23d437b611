//! HTTP 响应辅助函数和 DTO 转换

use api_contract::{ApiResponse, ChannelStatusDto, MetricsDto};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use domain::ChannelStatus;
use ems_telemetry::MetricsSnapshot;

/// 通道不存在
pub fn channel_not_found(channel_id: u32) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::<()>::error(
            "CHANNEL.NOT_FOUND",
            format!("channel {} not found", channel_id),
        )),
    )
        .into_response()
}

/// ChannelStatus 转 ChannelStatusDto
pub fn status_to_dto(status: ChannelStatus) -> ChannelStatusDto {
    ChannelStatusDto {
        channel_id: status.channel_id,
        name: status.name,
        protocol: status.protocol.as_str().to_string(),
        state: status.state.as_str().to_string(),
        connected: status.connected,
        last_update_ms: status.last_update_ms,
        active_point_count: status.active_point_count,
        last_error: status.last_error,
        consecutive_failures: status.consecutive_failures,
        decode_warnings: status.decode_warnings,
        publish_failures: status.publish_failures,
        stale_points: status.stale_points,
    }
}

/// MetricsSnapshot 转 MetricsDto
pub fn metrics_to_dto(snapshot: MetricsSnapshot) -> MetricsDto {
    let publish_latency_ms_avg = (snapshot.publish_latency_ms_count > 0).then(|| {
        snapshot.publish_latency_ms_total as f64 / snapshot.publish_latency_ms_count as f64
    });
    MetricsDto {
        polls_ok: snapshot.polls_ok,
        polls_failed: snapshot.polls_failed,
        connect_attempts: snapshot.connect_attempts,
        connect_failures: snapshot.connect_failures,
        read_failures: snapshot.read_failures,
        poll_timeouts: snapshot.poll_timeouts,
        deferred_ticks: snapshot.deferred_ticks,
        decode_warnings: snapshot.decode_warnings,
        snapshots_published: snapshot.snapshots_published,
        snapshots_failed: snapshot.snapshots_failed,
        snapshots_dropped: snapshot.snapshots_dropped,
        publish_latency_ms_avg,
    }
}

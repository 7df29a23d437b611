//! 通道状态查询 handlers
//!
//! - GET /health
//! - GET /api/channels/status
//! - GET /api/channels/{id}/status

use crate::AppState;
use crate::utils::response::{channel_not_found, status_to_dto};
use api_contract::{ApiResponse, ChannelStatusDto, HealthResponse};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

pub async fn health(State(state): State<AppState>) -> Response {
    let statuses = state.status.list_statuses();
    let response = HealthResponse {
        status: "ok".to_string(),
        channels: statuses.len(),
        connected_channels: statuses.iter().filter(|s| s.connected).count(),
    };
    (StatusCode::OK, Json(ApiResponse::success(response))).into_response()
}

pub async fn list_channel_statuses(State(state): State<AppState>) -> Response {
    let data: Vec<ChannelStatusDto> = state
        .status
        .list_statuses()
        .into_iter()
        .map(status_to_dto)
        .collect();
    (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
}

pub async fn get_channel_status(
    State(state): State<AppState>,
    Path(channel_id): Path<u32>,
) -> Response {
    match state.status.get_status(channel_id) {
        Some(status) => (
            StatusCode::OK,
            Json(ApiResponse::success(status_to_dto(status))),
        )
            .into_response(),
        None => channel_not_found(channel_id),
    }
}

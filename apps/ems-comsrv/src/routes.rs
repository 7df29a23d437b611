//! 路由定义

use crate::AppState;
use crate::handlers;
use crate::middleware::request_context;
use axum::{Router, middleware, routing::get};
use tower_http::trace::TraceLayer;

/// 只读状态接口；同时支持 `/` 和 `/api/` 前缀。
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/channels/status", get(handlers::list_channel_statuses))
        .route(
            "/channels/:channel_id/status",
            get(handlers::get_channel_status),
        )
        .route("/metrics", get(handlers::get_metrics));

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api", api.clone())
        .merge(api)
        .layer(middleware::from_fn(request_context))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

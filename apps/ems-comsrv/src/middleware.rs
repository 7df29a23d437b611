//! 请求上下文中间件：为每个状态查询分配 request_id/trace_id，并在响应头回写。

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use ems_telemetry::{RequestIds, new_request_ids};
use std::time::Instant;
use tracing::{Instrument, debug};

const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");
const TRACE_ID_HEADER: HeaderName = HeaderName::from_static("x-trace-id");

pub async fn request_context(mut req: Request<Body>, next: Next) -> Response {
    let ids = new_request_ids();
    let span = tracing::info_span!(
        target: "ems.http",
        "request",
        request_id = %ids.request_id,
        trace_id = %ids.trace_id,
        method = %req.method(),
        path = %req.uri().path()
    );
    req.extensions_mut().insert(ids.clone());

    let started = Instant::now();
    let mut response = next.run(req).instrument(span.clone()).await;
    span.in_scope(|| {
        debug!(
            target: "ems.http",
            status = response.status().as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "status_query_served"
        );
    });

    write_ids(&mut response, &ids);
    response
}

fn write_ids(response: &mut Response, ids: &RequestIds) {
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&ids.request_id) {
        headers.insert(REQUEST_ID_HEADER, value);
    }
    if let Ok(value) = HeaderValue::from_str(&ids.trace_id) {
        headers.insert(TRACE_ID_HEADER, value);
    }
}

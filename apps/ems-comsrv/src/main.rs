//! comsrv：通道轮询 → 解码 → Redis 发布，附只读状态查询 HTTP。

mod handlers;
mod middleware;
mod routes;
mod utils;

use ems_config::{AppConfig, load_channels};
use ems_pipeline::{Publisher, PublisherConfig};
use ems_polling::{Scheduler, SchedulerConfig, StatusTracker};
use ems_protocol::{AdapterFactory, PlanLimits, RpcClientConfig};
use ems_storage::RedisSnapshotStore;
use ems_telemetry::init_tracing;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub status: Arc<StatusTracker>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;
    init_tracing();

    let definitions = load_channels(&config.channels_file, config.channel_defaults())?;
    info!(
        target: "ems.comsrv",
        file = %config.channels_file,
        channels = definitions.len(),
        "channels_loaded"
    );

    // 快照写入 Redis：{prefix}:{channel_id}:{type_code}
    let store = Arc::new(RedisSnapshotStore::connect(&config.redis_url)?);
    let publisher = Arc::new(Publisher::new(
        store,
        PublisherConfig {
            key_prefix: config.key_prefix.clone(),
            max_retries: config.publish_max_retries,
            backoff: Duration::from_millis(config.publish_backoff_ms),
            max_backoff: Duration::from_millis(config.publish_timeout_ms),
            write_timeout: Duration::from_millis(config.publish_timeout_ms),
        },
    ));

    let factory = AdapterFactory::new().with_rpc_config(RpcClientConfig {
        connect_timeout: Duration::from_millis(config.connect_timeout_ms),
        call_timeout: Duration::from_millis(config.read_timeout_ms),
        max_frame_bytes: config.rpc_max_frame_bytes,
    });
    let mut scheduler = Scheduler::new(
        SchedulerConfig {
            max_concurrent_polls: config.poll_concurrency,
            poll_timeout: Duration::from_millis(config.poll_timeout_ms),
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            backoff_max: Duration::from_millis(config.backoff_max_ms),
            stale_after_misses: config.stale_after_misses,
            plan_limits: PlanLimits::default(),
        },
        publisher,
    );
    for definition in definitions {
        let adapter = factory.for_channel(&definition.channel);
        scheduler.add_channel(definition.channel, definition.mappings, adapter)?;
    }

    let state = AppState {
        status: scheduler.status(),
    };
    scheduler.start()?;

    let app = routes::build_router(state);
    let listener = tokio::net::TcpListener::bind(&config.status_http_addr).await?;
    info!(target: "ems.http", addr = %config.status_http_addr, "status_http_listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown().await;
    info!(target: "ems.comsrv", "comsrv_stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(target: "ems.comsrv", error = %err, "ctrl_c_listener_failed");
        std::future::pending::<()>().await;
    }
    info!(target: "ems.comsrv", "shutdown_requested");
}

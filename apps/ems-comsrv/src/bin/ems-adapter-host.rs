//! 协议适配器宿主进程：通过按行分隔的 JSON RPC 为 comsrv 提供适配器。

use ems_config::AdapterHostConfig;
use ems_protocol::{AdapterFactory, AdapterHost};
use ems_telemetry::init_tracing;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let config = AdapterHostConfig::from_env()?;
    init_tracing();

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;

    let token = CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(target: "ems.rpc", error = %err, "ctrl_c_listener_failed");
            return;
        }
        signal_token.cancel();
    });

    let host = AdapterHost::new(AdapterFactory::new(), config.rpc_max_frame_bytes);
    host.serve(listener, token).await?;
    info!(target: "ems.rpc", "adapter_host_stopped");
    Ok(())
}

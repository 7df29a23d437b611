//! RPC 宿主：在独立进程中托管进程内适配器，通过 TCP 行帧对外提供服务。
//!
//! 每条客户端连接拥有自己的会话表；连接断开时关闭其全部会话。
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! let host = AdapterHost::new(AdapterFactory::new(), DEFAULT_MAX_FRAME_BYTES);
//! let listener = TcpListener::bind("127.0.0.1:7600").await?;
//! host.serve(listener, shutdown_token).await?;
//! ```

use super::wire::{
    encode_frame, read_frame, FrameError, RpcCall, RpcRequest, RpcResponse, RpcStatus,
};
use crate::adapter::{AdapterHandle, ProtocolAdapter};
use crate::factory::AdapterFactory;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 一条客户端连接上的会话
struct HostSession {
    adapter: Arc<dyn ProtocolAdapter>,
    handle: AdapterHandle,
}

/// 适配器宿主
#[derive(Clone)]
pub struct AdapterHost {
    factory: Arc<AdapterFactory>,
    max_frame_bytes: usize,
}

impl AdapterHost {
    pub fn new(factory: AdapterFactory, max_frame_bytes: usize) -> Self {
        Self {
            factory: Arc::new(factory),
            max_frame_bytes,
        }
    }

    /// 接受连接直到 `shutdown` 被取消。
    pub async fn serve(
        &self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> std::io::Result<()> {
        info!(
            target: "ems.rpc",
            addr = %listener.local_addr()?,
            "adapter_host_listening"
        );

        loop {
            let accepted = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
            };
            match accepted {
                Ok((stream, peer_addr)) => {
                    info!(target: "ems.rpc", peer = %peer_addr, "adapter_client_connected");
                    let host = self.clone();
                    let token = shutdown.child_token();
                    tokio::spawn(async move {
                        if let Err(e) = host.handle_connection(stream, token).await {
                            warn!(
                                target: "ems.rpc",
                                peer = %peer_addr,
                                error = %e,
                                "adapter_client_error"
                            );
                        }
                    });
                }
                Err(e) => {
                    error!(target: "ems.rpc", error = %e, "failed to accept connection");
                }
            }
        }
        Ok(())
    }

    async fn handle_connection(
        &self,
        stream: TcpStream,
        shutdown: CancellationToken,
    ) -> Result<(), FrameError> {
        let (read_half, mut writer) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        let mut sessions: HashMap<u64, HostSession> = HashMap::new();
        let mut next_handle: u64 = 1;

        let result = loop {
            let frame = tokio::select! {
                _ = shutdown.cancelled() => break Ok(()),
                frame = read_frame(&mut reader, self.max_frame_bytes) => frame,
            };
            let bytes = match frame {
                Ok(Some(bytes)) => bytes,
                Ok(None) => break Ok(()),
                Err(FrameError::TooLarge(limit)) => {
                    let response = RpcResponse::failure(
                        0,
                        RpcStatus::BadRequest,
                        format!("frame exceeds {} bytes", limit),
                    );
                    let _ = write_response(&mut writer, &response).await;
                    break Err(FrameError::TooLarge(limit));
                }
                Err(e) => break Err(e),
            };
            if bytes.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            let response = match serde_json::from_slice::<RpcRequest>(&bytes) {
                Ok(request) => {
                    self.dispatch(request, &mut sessions, &mut next_handle)
                        .await
                }
                Err(e) => RpcResponse::failure(0, RpcStatus::BadRequest, e.to_string()),
            };
            if let Err(e) = write_response(&mut writer, &response).await {
                break Err(e);
            }
        };

        for (_, session) in sessions.drain() {
            session.adapter.close(session.handle).await;
        }
        debug!(target: "ems.rpc", "adapter_client_sessions_released");
        result
    }

    async fn dispatch(
        &self,
        request: RpcRequest,
        sessions: &mut HashMap<u64, HostSession>,
        next_handle: &mut u64,
    ) -> RpcResponse {
        let id = request.id;
        match request.call {
            RpcCall::Ping => RpcResponse::ok(id),
            RpcCall::Connect { params } => {
                let adapter = self.factory.in_process(params.protocol());
                match adapter.connect(&params).await {
                    Ok(handle) => {
                        let host_handle = *next_handle;
                        *next_handle += 1;
                        sessions.insert(host_handle, HostSession { adapter, handle });
                        RpcResponse::connected(id, host_handle)
                    }
                    Err(e) => RpcResponse::from_connect_error(id, &e),
                }
            }
            RpcCall::ReadUnits { handle, ranges } => {
                let Some(session) = sessions.get(&handle) else {
                    return RpcResponse::failure(id, RpcStatus::UnknownHandle, handle.to_string());
                };
                match session.adapter.read_units(session.handle, &ranges).await {
                    Ok(buffer) => RpcResponse::units(id, &ranges, &buffer),
                    Err(e) => RpcResponse::from_read_error(id, &e),
                }
            }
            RpcCall::Close { handle } => {
                if let Some(session) = sessions.remove(&handle) {
                    session.adapter.close(session.handle).await;
                }
                RpcResponse::ok(id)
            }
        }
    }
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &RpcResponse,
) -> Result<(), FrameError> {
    writer.write_all(&encode_frame(response)?).await?;
    Ok(())
}

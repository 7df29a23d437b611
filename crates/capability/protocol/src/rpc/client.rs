//! RPC 桩适配器：通过 TCP 调用独立进程中托管的适配器。
//!
//! 每个桩持有一条到宿主的长连接，调用串行执行。传输层故障（超时、断开、帧错误）
//! 会丢弃该连接，并映射为 `ConnectError` / `ReadError`；下一次 `connect` 重新拨号。

use super::wire::{
    encode_frame, read_frame, FrameError, RpcCall, RpcRequest, RpcResponse, RpcStatus,
    DEFAULT_MAX_FRAME_BYTES,
};
use crate::adapter::{AdapterHandle, ProtocolAdapter};
use crate::error::{ConnectError, ReadError};
use async_trait::async_trait;
use domain::{ConnectionParams, RawUnitBuffer, UnitRange};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// RPC 客户端配置
#[derive(Debug, Clone)]
pub struct RpcClientConfig {
    /// 拨号及 `connect` 调用的超时
    pub connect_timeout: Duration,
    /// 其余单次调用超时（写请求 + 读响应）
    pub call_timeout: Duration,
    pub max_frame_bytes: usize,
}

impl Default for RpcClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(5000),
            call_timeout: Duration::from_millis(5000),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

/// 传输层失败
#[derive(Debug, Clone, PartialEq, Eq)]
enum RpcFailure {
    Timeout(String),
    Disconnected(String),
    Malformed(String),
}

impl RpcFailure {
    fn into_connect_error(self) -> ConnectError {
        match self {
            Self::Timeout(m) => ConnectError::Timeout(m),
            Self::Disconnected(m) | Self::Malformed(m) => ConnectError::Refused(m),
        }
    }

    fn into_read_error(self) -> ReadError {
        match self {
            Self::Timeout(m) => ReadError::Timeout(m),
            Self::Disconnected(m) => ReadError::Disconnected(m),
            Self::Malformed(m) => ReadError::Malformed(m),
        }
    }
}

impl From<FrameError> for RpcFailure {
    fn from(err: FrameError) -> Self {
        let message = err.to_string();
        match err {
            FrameError::Io(_) | FrameError::Truncated => Self::Disconnected(message),
            FrameError::TooLarge(_) | FrameError::Json(_) => Self::Malformed(message),
        }
    }
}

struct RpcConnection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

/// 远程适配器桩
pub struct RpcAdapter {
    endpoint: String,
    config: RpcClientConfig,
    connection: Mutex<Option<RpcConnection>>,
    next_id: AtomicU64,
}

impl RpcAdapter {
    pub fn new(endpoint: impl Into<String>, config: RpcClientConfig) -> Self {
        Self {
            endpoint: endpoint.into(),
            config,
            connection: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn dial(&self) -> Result<RpcConnection, RpcFailure> {
        let stream = timeout(self.config.connect_timeout, TcpStream::connect(&self.endpoint))
            .await
            .map_err(|_| RpcFailure::Timeout(format!("dial {} timed out", self.endpoint)))?
            .map_err(|e| RpcFailure::Disconnected(format!("dial {}: {}", self.endpoint, e)))?;
        stream.set_nodelay(true).ok();
        let (read_half, write_half) = stream.into_split();
        info!(target: "ems.rpc", endpoint = %self.endpoint, "rpc_host_connected");
        Ok(RpcConnection {
            reader: BufReader::new(read_half),
            writer: write_half,
        })
    }

    /// 发起一次调用；`dial_if_needed` 仅对 connect/ping 为真。
    async fn call(&self, call: RpcCall, dial_if_needed: bool) -> Result<RpcResponse, RpcFailure> {
        let mut guard = self.connection.lock().await;
        if guard.is_none() {
            if !dial_if_needed {
                return Err(RpcFailure::Disconnected(format!(
                    "no connection to {}",
                    self.endpoint
                )));
            }
            *guard = Some(self.dial().await?);
        }
        let Some(connection) = guard.as_mut() else {
            return Err(RpcFailure::Disconnected("connection unavailable".to_string()));
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let method = call.method();
        let limit = match &call {
            RpcCall::Connect { .. } => self.config.connect_timeout,
            _ => self.config.call_timeout,
        };
        let request = RpcRequest { id, call };
        let result = timeout(limit, exchange(connection, &request, self.config.max_frame_bytes))
            .await
            .unwrap_or_else(|_| {
                Err(RpcFailure::Timeout(format!("{} call exceeded {:?}", method, limit)))
            });

        match result {
            Ok(response) if response.id == id => Ok(response),
            Ok(response) => {
                *guard = None;
                Err(RpcFailure::Malformed(format!(
                    "response id {} does not match request {}",
                    response.id, id
                )))
            }
            Err(failure) => {
                warn!(
                    target: "ems.rpc",
                    endpoint = %self.endpoint,
                    method,
                    error = ?failure,
                    "rpc_call_failed"
                );
                *guard = None;
                Err(failure)
            }
        }
    }
}

async fn exchange(
    connection: &mut RpcConnection,
    request: &RpcRequest,
    max_frame_bytes: usize,
) -> Result<RpcResponse, RpcFailure> {
    let frame = encode_frame(request)?;
    connection
        .writer
        .write_all(&frame)
        .await
        .map_err(|e| RpcFailure::Disconnected(e.to_string()))?;
    let bytes = read_frame(&mut connection.reader, max_frame_bytes)
        .await?
        .ok_or_else(|| RpcFailure::Disconnected("host closed the connection".to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| RpcFailure::Malformed(e.to_string()))
}

#[async_trait]
impl ProtocolAdapter for RpcAdapter {
    fn name(&self) -> &'static str {
        "rpc"
    }

    async fn connect(&self, params: &ConnectionParams) -> Result<AdapterHandle, ConnectError> {
        let response = self
            .call(
                RpcCall::Connect {
                    params: params.clone(),
                },
                true,
            )
            .await
            .map_err(RpcFailure::into_connect_error)?;
        response.into_connect_result().map(AdapterHandle)
    }

    async fn read_units(
        &self,
        handle: AdapterHandle,
        ranges: &[UnitRange],
    ) -> Result<RawUnitBuffer, ReadError> {
        let response = self
            .call(
                RpcCall::ReadUnits {
                    handle: handle.0,
                    ranges: ranges.to_vec(),
                },
                false,
            )
            .await
            .map_err(RpcFailure::into_read_error)?;
        response.into_read_result(ranges)
    }

    async fn close(&self, handle: AdapterHandle) {
        match self.call(RpcCall::Close { handle: handle.0 }, false).await {
            Ok(_) => debug!(target: "ems.rpc", handle = %handle, "rpc_session_closed"),
            Err(failure) => {
                debug!(target: "ems.rpc", handle = %handle, error = ?failure, "rpc_close_skipped")
            }
        }
    }

    async fn probe(&self) -> bool {
        matches!(
            self.call(RpcCall::Ping, true).await,
            Ok(RpcResponse {
                status: RpcStatus::Ok,
                ..
            })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::VirtualParams;
    use tokio::io::AsyncBufReadExt;
    use tokio::net::TcpListener;

    fn fast_config() -> RpcClientConfig {
        RpcClientConfig {
            connect_timeout: Duration::from_millis(500),
            call_timeout: Duration::from_millis(200),
            max_frame_bytes: 4096,
        }
    }

    #[tokio::test]
    async fn unreachable_host_is_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let adapter = RpcAdapter::new(addr.to_string(), fast_config());
        let err = adapter
            .connect(&ConnectionParams::Virtual(VirtualParams::default()))
            .await
            .expect_err("refused");
        assert!(matches!(err, ConnectError::Refused(_)));
        assert!(!adapter.probe().await);
    }

    #[tokio::test]
    async fn read_without_session_is_disconnected() {
        let adapter = RpcAdapter::new("127.0.0.1:9", fast_config());
        let err = adapter
            .read_units(AdapterHandle(1), &[])
            .await
            .expect_err("no connection");
        assert!(matches!(err, ReadError::Disconnected(_)));
    }

    #[tokio::test]
    async fn silent_host_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let mut reader = BufReader::new(stream);
            let mut line = String::new();
            let _ = reader.read_line(&mut line).await;
            tokio::time::sleep(Duration::from_secs(2)).await;
        });

        let adapter = RpcAdapter::new(addr.to_string(), fast_config());
        let err = adapter
            .connect(&ConnectionParams::Virtual(VirtualParams::default()))
            .await
            .expect_err("timeout");
        assert!(matches!(err, ConnectError::Timeout(_)));
        server.abort();
    }

    #[tokio::test]
    async fn garbage_response_is_malformed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let (read_half, mut write_half) = stream.into_split();
            let mut reader = BufReader::new(read_half);
            let mut line = String::new();
            let _ = reader.read_line(&mut line).await;
            let _ = write_half.write_all(b"{\"id\":1,\"status\":\"ok\",\"handle\":4}\n").await;
            line.clear();
            let _ = reader.read_line(&mut line).await;
            let _ = write_half.write_all(b"not json\n").await;
            tokio::time::sleep(Duration::from_millis(200)).await;
        });

        let adapter = RpcAdapter::new(addr.to_string(), fast_config());
        let handle = adapter
            .connect(&ConnectionParams::Virtual(VirtualParams::default()))
            .await
            .expect("connect");
        assert_eq!(handle, AdapterHandle(4));
        let err = adapter
            .read_units(handle, &[])
            .await
            .expect_err("malformed");
        assert!(matches!(err, ReadError::Malformed(_)));
        server.abort();
    }
}

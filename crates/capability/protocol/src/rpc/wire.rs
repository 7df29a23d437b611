//! RPC 帧格式：TCP 上按行分隔的 JSON，一行一个请求或响应。
//!
//! ```text
//! -> {"id":1,"method":"connect","params":{"protocol":"modbus_tcp","host":"10.0.0.5"}}
//! <- {"id":1,"status":"ok","handle":3}
//! -> {"id":2,"method":"read_units","handle":3,"ranges":[{"kind":"holding_register","start":0,"count":2}]}
//! <- {"id":2,"status":"ok","units":[{"kind":"holding_register","start":0,"values":[165,90]}]}
//! ```

use crate::error::{ConnectError, ReadError};
use domain::{ConnectionParams, RawUnitBuffer, UnitKind, UnitRange};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

/// 默认最大帧（1 MiB），可容纳 65536 个寄存器的完整读取结果。
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub id: u64,
    #[serde(flatten)]
    pub call: RpcCall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum RpcCall {
    Connect { params: ConnectionParams },
    ReadUnits { handle: u64, ranges: Vec<UnitRange> },
    Close { handle: u64 },
    Ping,
}

impl RpcCall {
    pub fn method(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connect",
            Self::ReadUnits { .. } => "read_units",
            Self::Close { .. } => "close",
            Self::Ping => "ping",
        }
    }
}

/// 响应状态码，与适配器错误分类一一对应。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RpcStatus {
    Ok,
    ConnectRefused,
    ConnectTimeout,
    ConnectInvalidParams,
    ReadTimeout,
    ReadMalformed,
    ReadDisconnected,
    ReadException,
    UnknownHandle,
    BadRequest,
}

/// 一段连续单元值
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireUnits {
    pub kind: UnitKind,
    pub start: u16,
    pub values: Vec<u16>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub id: u64,
    pub status: RpcStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub units: Vec<WireUnits>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RpcResponse {
    pub fn ok(id: u64) -> Self {
        Self {
            id,
            status: RpcStatus::Ok,
            handle: None,
            units: Vec::new(),
            message: None,
        }
    }

    pub fn failure(id: u64, status: RpcStatus, message: impl Into<String>) -> Self {
        Self {
            id,
            status,
            handle: None,
            units: Vec::new(),
            message: Some(message.into()),
        }
    }

    pub fn connected(id: u64, handle: u64) -> Self {
        Self {
            handle: Some(handle),
            ..Self::ok(id)
        }
    }

    /// 按请求区间把缓冲切分为连续段。
    pub fn units(id: u64, ranges: &[UnitRange], buffer: &RawUnitBuffer) -> Self {
        let units = ranges
            .iter()
            .map(|range| WireUnits {
                kind: range.kind,
                start: range.start,
                values: range
                    .addresses()
                    .map(|address| buffer.get(range.kind, address).unwrap_or(0))
                    .collect(),
            })
            .collect();
        Self {
            units,
            ..Self::ok(id)
        }
    }

    pub fn from_connect_error(id: u64, err: &ConnectError) -> Self {
        let (status, message) = match err {
            ConnectError::Refused(m) => (RpcStatus::ConnectRefused, m),
            ConnectError::Timeout(m) => (RpcStatus::ConnectTimeout, m),
            ConnectError::InvalidParams(m) => (RpcStatus::ConnectInvalidParams, m),
        };
        Self::failure(id, status, message.clone())
    }

    pub fn from_read_error(id: u64, err: &ReadError) -> Self {
        let (status, message) = match err {
            ReadError::Timeout(m) => (RpcStatus::ReadTimeout, m.clone()),
            ReadError::Malformed(m) => (RpcStatus::ReadMalformed, m.clone()),
            ReadError::Disconnected(m) => (RpcStatus::ReadDisconnected, m.clone()),
            ReadError::Exception(m) => (RpcStatus::ReadException, m.clone()),
            ReadError::UnknownHandle(h) => (RpcStatus::UnknownHandle, h.to_string()),
        };
        Self::failure(id, status, message)
    }

    fn message_or_status(&self) -> String {
        self.message
            .clone()
            .unwrap_or_else(|| format!("{:?}", self.status))
    }

    /// 解释 connect 响应
    pub fn into_connect_result(self) -> Result<u64, ConnectError> {
        match self.status {
            RpcStatus::Ok => self.handle.ok_or_else(|| {
                ConnectError::Refused("connect response without handle".to_string())
            }),
            RpcStatus::ConnectTimeout => Err(ConnectError::Timeout(self.message_or_status())),
            RpcStatus::ConnectInvalidParams | RpcStatus::BadRequest => {
                Err(ConnectError::InvalidParams(self.message_or_status()))
            }
            _ => Err(ConnectError::Refused(self.message_or_status())),
        }
    }

    /// 解释 read_units 响应；返回段必须完整覆盖请求区间。
    pub fn into_read_result(self, ranges: &[UnitRange]) -> Result<RawUnitBuffer, ReadError> {
        match self.status {
            RpcStatus::Ok => {}
            RpcStatus::ReadTimeout => return Err(ReadError::Timeout(self.message_or_status())),
            RpcStatus::ReadDisconnected => {
                return Err(ReadError::Disconnected(self.message_or_status()));
            }
            RpcStatus::ReadException => {
                return Err(ReadError::Exception(self.message_or_status()));
            }
            RpcStatus::UnknownHandle => {
                let handle = self
                    .message
                    .as_deref()
                    .and_then(|m| m.parse().ok())
                    .unwrap_or_default();
                return Err(ReadError::UnknownHandle(handle));
            }
            _ => return Err(ReadError::Malformed(self.message_or_status())),
        }

        let mut buffer = RawUnitBuffer::new();
        for segment in &self.units {
            buffer.insert_range(segment.kind, segment.start, &segment.values);
        }
        for range in ranges {
            for address in range.addresses() {
                if buffer.get(range.kind, address).is_none() {
                    return Err(ReadError::Malformed(format!(
                        "response is missing unit {:?}@{}",
                        range.kind, address
                    )));
                }
            }
        }
        Ok(buffer)
    }
}

/// 帧读写错误
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame exceeds {0} bytes")]
    TooLarge(usize),

    #[error("connection closed mid-frame")]
    Truncated,

    #[error("invalid frame: {0}")]
    Json(#[from] serde_json::Error),
}

/// 序列化为一行帧（含结尾换行）。
pub fn encode_frame<T: Serialize>(value: &T) -> Result<Vec<u8>, FrameError> {
    let mut bytes = serde_json::to_vec(value)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// 读取一帧（不含换行）。对端正常关闭时返回 `None`。
pub async fn read_frame<R>(
    reader: &mut R,
    max_frame_bytes: usize,
) -> Result<Option<Vec<u8>>, FrameError>
where
    R: AsyncBufRead + Unpin,
{
    let limit = max_frame_bytes as u64 + 1;
    let mut buf = Vec::new();
    let read = (&mut *reader).take(limit).read_until(b'\n', &mut buf).await?;
    if read == 0 {
        return Ok(None);
    }
    if buf.last() != Some(&b'\n') {
        if read as u64 >= limit {
            return Err(FrameError::TooLarge(max_frame_bytes));
        }
        return Err(FrameError::Truncated);
    }
    buf.pop();
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    Ok(Some(buf))
}

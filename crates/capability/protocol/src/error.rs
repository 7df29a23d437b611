//! 协议适配器错误类型定义
//!
//! 进程内适配器与 RPC 桩共用同一套错误分类，调度器无需区分后端。

/// 建立会话失败
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectError {
    /// 对端拒绝或网络不可达
    #[error("connection refused: {0}")]
    Refused(String),

    /// 连接超时
    #[error("connect timeout: {0}")]
    Timeout(String),

    /// 参数与适配器不匹配或无法解析
    #[error("invalid connection params: {0}")]
    InvalidParams(String),
}

/// 读取单元失败
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReadError {
    /// 读取超时
    #[error("read timeout: {0}")]
    Timeout(String),

    /// 响应格式错误
    #[error("malformed response: {0}")]
    Malformed(String),

    /// 会话已断开
    #[error("disconnected: {0}")]
    Disconnected(String),

    /// 设备返回协议异常（如 Modbus 异常码）
    #[error("device exception: {0}")]
    Exception(String),

    /// 句柄不存在（已关闭或从未建立）
    #[error("unknown adapter handle: {0}")]
    UnknownHandle(u64),
}

pub(crate) fn connect_error_from_io(err: std::io::Error) -> ConnectError {
    match err.kind() {
        std::io::ErrorKind::TimedOut => ConnectError::Timeout(err.to_string()),
        std::io::ErrorKind::InvalidInput | std::io::ErrorKind::NotFound => {
            ConnectError::InvalidParams(err.to_string())
        }
        _ => ConnectError::Refused(err.to_string()),
    }
}

pub(crate) fn read_error_from_io(err: std::io::Error) -> ReadError {
    match err.kind() {
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
            ReadError::Timeout(err.to_string())
        }
        std::io::ErrorKind::InvalidData | std::io::ErrorKind::UnexpectedEof => {
            ReadError::Malformed(err.to_string())
        }
        _ => ReadError::Disconnected(err.to_string()),
    }
}

//! 存储层错误类型
//!
//! 写入失败分两类：
//! - 暂时不可用（连接、超时），发布器会重试
//! - 被拒绝（类型错误、脚本错误等），重试无意义

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorKind {
    Unavailable,
    Rejected,
}

#[derive(Debug)]
pub struct StorageError {
    kind: StorageErrorKind,
    message: String,
}

impl StorageError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            kind: StorageErrorKind::Unavailable,
            message: message.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            kind: StorageErrorKind::Rejected,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> StorageErrorKind {
        self.kind
    }

    pub fn is_rejected(&self) -> bool {
        self.kind == StorageErrorKind::Rejected
    }
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for StorageError {}

impl From<::redis::RedisError> for StorageError {
    fn from(err: ::redis::RedisError) -> Self {
        if err.is_io_error()
            || err.is_connection_refusal()
            || err.is_connection_dropped()
            || err.is_timeout()
        {
            Self::new(err.to_string())
        } else {
            Self::rejected(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_kind_is_unavailable() {
        let err = StorageError::new("connection reset");
        assert_eq!(err.kind(), StorageErrorKind::Unavailable);
        assert!(!err.is_rejected());
        assert_eq!(err.to_string(), "connection reset");
        assert!(StorageError::rejected("WRONGTYPE").is_rejected());
    }
}

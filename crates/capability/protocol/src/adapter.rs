//! 协议适配器接口与会话表。

use crate::error::{ConnectError, ReadError};
use async_trait::async_trait;
use domain::{ConnectionParams, RawUnitBuffer, UnitRange};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// 适配器会话句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AdapterHandle(pub u64);

impl std::fmt::Display for AdapterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 协议适配器：只负责建立会话、读取原始单元、关闭会话。
///
/// 新协议实现该 trait 即可接入，调度器不感知具体协议。
#[async_trait]
pub trait ProtocolAdapter: Send + Sync {
    /// 适配器名称（用于日志）
    fn name(&self) -> &'static str;

    async fn connect(&self, params: &ConnectionParams) -> Result<AdapterHandle, ConnectError>;

    /// 读取全部区间；任一区间失败则整体失败，不返回部分结果。
    async fn read_units(
        &self,
        handle: AdapterHandle,
        ranges: &[UnitRange],
    ) -> Result<RawUnitBuffer, ReadError>;

    /// 关闭会话。重复关闭或未知句柄不报错。
    async fn close(&self, handle: AdapterHandle);

    /// 存活探测；进程内适配器恒为 true。
    async fn probe(&self) -> bool {
        true
    }
}

/// 句柄到会话的映射。会话本身由 `tokio::sync::Mutex` 保护，保证同一会话上的请求串行。
pub(crate) struct SessionTable<S> {
    next: AtomicU64,
    sessions: Mutex<HashMap<u64, Arc<tokio::sync::Mutex<S>>>>,
}

impl<S> SessionTable<S> {
    pub(crate) fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn insert(&self, session: S) -> AdapterHandle {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        let mut sessions = self
            .sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        sessions.insert(id, Arc::new(tokio::sync::Mutex::new(session)));
        AdapterHandle(id)
    }

    pub(crate) fn get(
        &self,
        handle: AdapterHandle,
    ) -> Result<Arc<tokio::sync::Mutex<S>>, ReadError> {
        let sessions = self
            .sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        sessions
            .get(&handle.0)
            .cloned()
            .ok_or(ReadError::UnknownHandle(handle.0))
    }

    pub(crate) fn remove(&self, handle: AdapterHandle) -> Option<Arc<tokio::sync::Mutex<S>>> {
        let mut sessions = self
            .sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        sessions.remove(&handle.0)
    }

    pub(crate) fn len(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

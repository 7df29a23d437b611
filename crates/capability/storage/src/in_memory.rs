//! 快照内存实现
//!
//! 用于测试。可注入写入失败、拒绝与延迟。

use crate::error::StorageError;
use crate::traits::SnapshotStore;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

/// 快照内存存储
#[derive(Default)]
pub struct InMemorySnapshotStore {
    hashes: RwLock<HashMap<String, HashMap<String, String>>>,
    fail_next: AtomicU32,
    fail_all: AtomicBool,
    reject_all: AtomicBool,
    write_delay_ms: AtomicU64,
    write_attempts: AtomicU64,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 接下来 `count` 次写入返回不可用错误。
    pub fn fail_next_writes(&self, count: u32) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    pub fn fail_all_writes(&self, enabled: bool) {
        self.fail_all.store(enabled, Ordering::SeqCst);
    }

    pub fn reject_writes(&self, enabled: bool) {
        self.reject_all.store(enabled, Ordering::SeqCst);
    }

    pub fn set_write_delay(&self, delay: Duration) {
        self.write_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// 写入尝试次数（含失败）
    pub fn write_attempts(&self) -> u64 {
        self.write_attempts.load(Ordering::SeqCst)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .hashes
            .read()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    /// 读取单个字段（用于测试）
    pub fn field(&self, key: &str, field: &str) -> Option<String> {
        self.hashes
            .read()
            .ok()
            .and_then(|m| m.get(key).and_then(|h| h.get(field).cloned()))
    }

    fn injected_failure(&self) -> Option<StorageError> {
        if self.reject_all.load(Ordering::SeqCst) {
            return Some(StorageError::rejected("write rejected"));
        }
        if self.fail_all.load(Ordering::SeqCst) {
            return Some(StorageError::new("store unavailable"));
        }
        let consumed = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        consumed.then(|| StorageError::new("store unavailable"))
    }
}

#[async_trait::async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn write_fields(
        &self,
        key: &str,
        fields: &[(String, String)],
    ) -> Result<(), StorageError> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        let delay = self.write_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if let Some(err) = self.injected_failure() {
            return Err(err);
        }
        let mut hashes = self
            .hashes
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let hash = hashes.entry(key.to_string()).or_default();
        for (field, value) in fields {
            hash.insert(field.clone(), value.clone());
        }
        Ok(())
    }

    async fn read_fields(&self, key: &str) -> Result<HashMap<String, String>, StorageError> {
        let hashes = self
            .hashes
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(hashes.get(key).cloned().unwrap_or_default())
    }
}

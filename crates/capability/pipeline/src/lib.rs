//! 快照发布器。
//!
//! 每个快照写成一个 Redis 哈希 `{prefix}:{channel_id}:{type_code}`，
//! 字段为点位号加 `_timestamp`，一次 HSET 原子写入。
//! 写入失败按倍增退避重试，超过上限后丢弃并记录日志；发布器不缓冲、不重放。

use domain::Snapshot;
use ems_decode::render_fields;
use ems_storage::{SnapshotStore, StorageError, TIMESTAMP_FIELD, snapshot_key};
use ems_telemetry::{
    record_publish_latency_ms, record_snapshot_dropped, record_snapshot_failed,
    record_snapshot_published,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// 发布错误。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PublishError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("write rejected: {0}")]
    Rejected(String),
    #[error("write timed out")]
    Timeout,
}

impl From<StorageError> for PublishError {
    fn from(err: StorageError) -> Self {
        if err.is_rejected() {
            Self::Rejected(err.to_string())
        } else {
            Self::Unavailable(err.to_string())
        }
    }
}

/// 发布参数。
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub key_prefix: String,
    /// 首次写入之外的重试次数
    pub max_retries: u32,
    pub backoff: Duration,
    pub max_backoff: Duration,
    /// 单次写入超时
    pub write_timeout: Duration,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            key_prefix: "comsrv".to_string(),
            max_retries: 3,
            backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
            write_timeout: Duration::from_secs(2),
        }
    }
}

/// 成功发布的回执。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    pub key: String,
    /// 写入的点位字段数（不含时间戳）
    pub fields: usize,
    pub attempts: u32,
}

pub struct Publisher {
    store: Arc<dyn SnapshotStore>,
    config: PublisherConfig,
}

impl Publisher {
    pub fn new(store: Arc<dyn SnapshotStore>, config: PublisherConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &PublisherConfig {
        &self.config
    }

    pub fn key_for(&self, snapshot: &Snapshot) -> String {
        snapshot_key(
            &self.config.key_prefix,
            snapshot.channel_id,
            snapshot.data_type,
        )
    }

    /// 发布一个快照。空快照不写入。
    pub async fn publish(&self, snapshot: &Snapshot) -> Result<PublishReceipt, PublishError> {
        let key = self.key_for(snapshot);
        if snapshot.is_empty() {
            return Ok(PublishReceipt {
                key,
                fields: 0,
                attempts: 0,
            });
        }

        let mut fields = render_fields(snapshot);
        let point_fields = fields.len();
        fields.push((
            TIMESTAMP_FIELD.to_string(),
            snapshot.timestamp_ms.div_euclid(1000).to_string(),
        ));

        let started_at = Instant::now();
        let mut delay = self.config.backoff;
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let write = self.store.write_fields(&key, &fields);
            let result = match tokio::time::timeout(self.config.write_timeout, write).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(err)) => Err(PublishError::from(err)),
                Err(_) => Err(PublishError::Timeout),
            };

            let err = match result {
                Ok(()) => {
                    record_snapshot_published();
                    record_publish_latency_ms(started_at.elapsed().as_millis() as u64);
                    debug!(
                        target: "ems.publish",
                        key = %key,
                        fields = point_fields,
                        attempts,
                        "snapshot_published"
                    );
                    return Ok(PublishReceipt {
                        key,
                        fields: point_fields,
                        attempts,
                    });
                }
                Err(err) => err,
            };

            record_snapshot_failed();
            let retryable = !matches!(err, PublishError::Rejected(_));
            if !retryable || attempts > self.config.max_retries {
                record_snapshot_dropped();
                warn!(
                    target: "ems.publish",
                    key = %key,
                    fields = point_fields,
                    attempts,
                    error = %err,
                    "snapshot_dropped"
                );
                return Err(err);
            }

            warn!(
                target: "ems.publish",
                key = %key,
                attempt = attempts,
                retry_in_ms = delay.as_millis() as u64,
                error = %err,
                "snapshot_write_failed"
            );
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(self.config.max_backoff);
        }
    }
}

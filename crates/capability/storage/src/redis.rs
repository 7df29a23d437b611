//! Redis 快照写入实现

use crate::error::StorageError;
use crate::traits::SnapshotStore;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Redis 快照存储
///
/// 复用一条多路复用连接；写入失败时丢弃连接，下一次写入重新建立。
pub struct RedisSnapshotStore {
    client: redis::Client,
    connection: Mutex<Option<MultiplexedConnection>>,
}

impl RedisSnapshotStore {
    pub fn new(client: redis::Client) -> Self {
        Self {
            client,
            connection: Mutex::new(None),
        }
    }

    pub fn connect(redis_url: &str) -> Result<Self, StorageError> {
        let client = redis::Client::open(redis_url)
            .map_err(|err| StorageError::rejected(err.to_string()))?;
        Ok(Self::new(client))
    }

    async fn connection(&self) -> Result<MultiplexedConnection, StorageError> {
        let mut guard = self.connection.lock().await;
        if let Some(connection) = guard.as_ref() {
            return Ok(connection.clone());
        }
        let connection = self
            .client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(StorageError::from)?;
        *guard = Some(connection.clone());
        Ok(connection)
    }

    async fn reset(&self) {
        self.connection.lock().await.take();
    }
}

#[async_trait::async_trait]
impl SnapshotStore for RedisSnapshotStore {
    async fn write_fields(
        &self,
        key: &str,
        fields: &[(String, String)],
    ) -> Result<(), StorageError> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut connection = self.connection().await?;
        let result = connection.hset_multiple::<_, _, _, ()>(key, fields).await;
        if let Err(err) = result {
            let err = StorageError::from(err);
            if !err.is_rejected() {
                self.reset().await;
            }
            return Err(err);
        }
        Ok(())
    }

    async fn read_fields(&self, key: &str) -> Result<HashMap<String, String>, StorageError> {
        let mut connection = self.connection().await?;
        let result: Result<HashMap<String, String>, _> = connection.hgetall(key).await;
        match result {
            Ok(fields) => Ok(fields),
            Err(err) => {
                let err = StorageError::from(err);
                if !err.is_rejected() {
                    self.reset().await;
                }
                Err(err)
            }
        }
    }
}

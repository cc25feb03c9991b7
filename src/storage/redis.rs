//! Redis storage for the published root.
//!
//! The record lives under one key as JSON:
//!
//! ```json
//! {"root": "0x5a1f...", "leaf_count": 1204, "published_at": 1767084657058}
//! ```
//!
//! A single `SET` replaces it, so publish is atomic without a transaction.
//! Useful where web handlers read the root far more often than rebuilds
//! write it.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tracing::{debug, instrument};

use super::traits::{RootRecord, RootStore, StorageError};
use crate::resilience::retry::{retry, RetryConfig};

const ROOT_KEY: &str = "merkle:root";

pub struct RedisRootStore {
    connection: ConnectionManager,
    /// Optional key prefix for namespacing (e.g., "humartz:" → "humartz:merkle:root")
    prefix: String,
}

impl RedisRootStore {
    pub async fn new(connection_string: &str) -> Result<Self, StorageError> {
        Self::with_prefix(connection_string, None).await
    }

    /// Connect with an optional key prefix, for sharing a Redis instance.
    pub async fn with_prefix(
        connection_string: &str,
        prefix: Option<&str>,
    ) -> Result<Self, StorageError> {
        let client = Client::open(connection_string)
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let connection = retry("redis_connect", &RetryConfig::startup(), || async {
            ConnectionManager::new(client.clone()).await
        })
        .await
        .map_err(|e: redis::RedisError| StorageError::Backend(e.to_string()))?;

        Ok(Self {
            connection,
            prefix: prefix.unwrap_or("").to_string(),
        })
    }

    fn root_key(&self) -> String {
        format!("{}{}", self.prefix, ROOT_KEY)
    }
}

#[async_trait]
impl RootStore for RedisRootStore {
    #[instrument(skip(self))]
    async fn current(&self) -> Result<Option<RootRecord>, StorageError> {
        let key = self.root_key();
        let mut conn = self.connection.clone();

        let raw: Option<String> = conn
            .get(&key)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to get merkle root: {}", e)))?;

        raw.map(|json| {
            serde_json::from_str(&json).map_err(|e| StorageError::Corruption {
                key: key.clone(),
                reason: e.to_string(),
            })
        })
        .transpose()
    }

    #[instrument(skip(self, record), fields(root = %record.root))]
    async fn publish(&self, record: &RootRecord) -> Result<(), StorageError> {
        let json = serde_json::to_string(record)
            .map_err(|e| StorageError::Backend(format!("Failed to encode root record: {}", e)))?;
        let mut conn = self.connection.clone();

        conn.set::<_, _, ()>(self.root_key(), json)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to publish merkle root: {}", e)))?;

        debug!(leaf_count = record.leaf_count, "Merkle root published to Redis");
        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        let mut conn = self.connection.clone();
        conn.del::<_, ()>(self.root_key())
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to clear merkle root: {}", e)))?;
        Ok(())
    }
}

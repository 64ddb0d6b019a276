//! Redis-backed fast tier for the dynamic configuration.

use async_trait::async_trait;
use redis::AsyncCommands;
use rolegate_application::{DynamicConfigCache, StoredDynamicConfig};
use rolegate_core::{AppError, AppResult};
use rolegate_domain::DynamicConfigDocument;
use serde::{Deserialize, Serialize};

/// Redis implementation of the dynamic configuration cache.
#[derive(Clone)]
pub struct RedisDynamicConfigCache {
    client: redis::Client,
    key: String,
}

#[derive(Serialize, Deserialize)]
struct CachedConfig {
    id: String,
    config: DynamicConfigDocument,
    checksum: String,
    updated_by: String,
    updated_at: i64,
}

impl RedisDynamicConfigCache {
    /// Creates a cache adapter storing the configuration under `{key_prefix}:dynamic-config`.
    #[must_use]
    pub fn new(client: redis::Client, key_prefix: &str) -> Self {
        Self {
            client,
            key: format!("{key_prefix}:dynamic-config"),
        }
    }

    async fn connection(&self) -> AppResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Internal(format!("failed to connect to redis: {error}")))
    }
}

#[async_trait]
impl DynamicConfigCache for RedisDynamicConfigCache {
    async fn get_current(&self) -> AppResult<Option<StoredDynamicConfig>> {
        let mut connection = self.connection().await?;
        let encoded: Option<String> = connection.get(self.key.as_str()).await.map_err(|error| {
            AppError::Internal(format!("failed to read cached dynamic configuration: {error}"))
        })?;

        encoded
            .map(|encoded| {
                serde_json::from_str::<CachedConfig>(encoded.as_str())
                    .map(|cached| StoredDynamicConfig {
                        id: cached.id,
                        document: cached.config,
                        checksum: cached.checksum,
                        updated_by: cached.updated_by,
                        updated_at: cached.updated_at,
                    })
                    .map_err(|error| {
                        AppError::Internal(format!(
                            "invalid cached dynamic configuration: {error}"
                        ))
                    })
            })
            .transpose()
    }

    async fn put_current(&self, version: &StoredDynamicConfig) -> AppResult<()> {
        let encoded = serde_json::to_string(&CachedConfig {
            id: version.id.clone(),
            config: version.document.clone(),
            checksum: version.checksum.clone(),
            updated_by: version.updated_by.clone(),
            updated_at: version.updated_at,
        })
        .map_err(|error| {
            AppError::Internal(format!("failed to encode dynamic configuration: {error}"))
        })?;

        let mut connection = self.connection().await?;
        connection
            .set(self.key.as_str(), encoded)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to write cached dynamic configuration: {error}"))
            })
    }
}

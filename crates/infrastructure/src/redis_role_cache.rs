//! Redis-backed fast tier for role documents.

use async_trait::async_trait;
use redis::AsyncCommands;
use rolegate_application::{FastRoleCache, FastTierRole};
use rolegate_core::{AppError, AppResult};
use rolegate_domain::{RoleDocument, RoleKey};
use serde::{Deserialize, Serialize};

/// Redis implementation of the fast role tier.
///
/// Entries expire in Redis after the freshness horizon; the service still
/// checks `cached_at` because the horizon is configured per call.
#[derive(Clone)]
pub struct RedisRoleCache {
    client: redis::Client,
    key_prefix: String,
}

#[derive(Serialize, Deserialize)]
struct CachedRole {
    role: RoleDocument,
    cached_at: i64,
}

impl RedisRoleCache {
    /// Creates a cache adapter with a configured Redis client and key prefix.
    #[must_use]
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
        }
    }

    fn key_for(&self, account_id: &str, arn: &str) -> String {
        format!("{}:role:{account_id}:{arn}", self.key_prefix)
    }
}

#[async_trait]
impl FastRoleCache for RedisRoleCache {
    async fn get_role(&self, key: &RoleKey) -> AppResult<Option<FastTierRole>> {
        let mut connection = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Internal(format!("failed to connect to redis: {error}")))?;

        let encoded: Option<String> = connection
            .get(self.key_for(key.account_id(), key.arn()))
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to read role cache entry: {error}"))
            })?;

        let Some(encoded) = encoded else {
            return Ok(None);
        };

        let cached: CachedRole = serde_json::from_str(encoded.as_str()).map_err(|error| {
            AppError::Internal(format!(
                "invalid role cache entry for '{}': {error}",
                key.arn()
            ))
        })?;

        Ok(Some(FastTierRole {
            role: cached.role,
            cached_at: cached.cached_at,
        }))
    }

    async fn put_role(
        &self,
        key: &RoleKey,
        entry: FastTierRole,
        freshness_seconds: u32,
    ) -> AppResult<()> {
        if freshness_seconds == 0 {
            return Ok(());
        }

        let key = self.key_for(key.account_id(), key.arn());
        let value = serde_json::to_string(&CachedRole {
            role: entry.role,
            cached_at: entry.cached_at,
        })
        .map_err(|error| AppError::Internal(format!("failed to encode role cache entry: {error}")))?;

        let mut connection = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Internal(format!("failed to connect to redis: {error}")))?;

        connection
            .set_ex(key, value, u64::from(freshness_seconds))
            .await
            .map_err(|error| AppError::Internal(format!("failed to write role cache entry: {error}")))
    }
}

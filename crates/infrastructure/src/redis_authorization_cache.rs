//! Redis-backed per-user authorization cache.

use async_trait::async_trait;
use redis::AsyncCommands;
use rolegate_application::AuthorizationCache;
use rolegate_core::{AppError, AppResult};
use rolegate_domain::RoleMapping;

/// Redis implementation of the eligible-roles cache.
///
/// One key per `(user, console_only)` pair, each with its own expiry.
#[derive(Clone)]
pub struct RedisAuthorizationCache {
    client: redis::Client,
    key_prefix: String,
}

impl RedisAuthorizationCache {
    /// Creates a cache adapter with a configured Redis client and key prefix.
    #[must_use]
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
        }
    }

    fn key_for(&self, user: &str, console_only: bool) -> String {
        format!(
            "{}:eligible:{}:console_only={console_only}",
            self.key_prefix,
            user.to_lowercase()
        )
    }

    async fn connection(&self) -> AppResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Internal(format!("failed to connect to redis: {error}")))
    }
}

#[async_trait]
impl AuthorizationCache for RedisAuthorizationCache {
    async fn get_eligible_roles(
        &self,
        user: &str,
        console_only: bool,
    ) -> AppResult<Option<Vec<RoleMapping>>> {
        let mut connection = self.connection().await?;
        let encoded: Option<String> = connection
            .get(self.key_for(user, console_only))
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to read authorization cache entry: {error}"))
            })?;

        encoded
            .map(|encoded| {
                serde_json::from_str::<Vec<RoleMapping>>(encoded.as_str()).map_err(|error| {
                    AppError::Internal(format!("invalid authorization cache entry: {error}"))
                })
            })
            .transpose()
    }

    async fn put_eligible_roles(
        &self,
        user: &str,
        console_only: bool,
        roles: &[RoleMapping],
        ttl_seconds: u32,
    ) -> AppResult<()> {
        if ttl_seconds == 0 {
            return Ok(());
        }

        let encoded = serde_json::to_string(roles).map_err(|error| {
            AppError::Internal(format!("failed to encode authorization cache entry: {error}"))
        })?;

        let mut connection = self.connection().await?;
        connection
            .set_ex(self.key_for(user, console_only), encoded, u64::from(ttl_seconds))
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to write authorization cache entry: {error}"))
            })
    }

    async fn invalidate_user(&self, user: &str) -> AppResult<()> {
        let keys = [self.key_for(user, false), self.key_for(user, true)];
        let mut connection = self.connection().await?;
        connection.del(&keys[..]).await.map_err(|error| {
            AppError::Internal(format!("failed to invalidate authorization cache: {error}"))
        })
    }
}

//! Adapter selection and service wiring shared by the binaries.

use std::sync::Arc;

use rolegate_application::{
    AccessRequestNotifier, AccessRequestRepository, AccessRequestService, AuthorizationCache,
    AuthorizationService, CloudRoleSource, DurableRoleRepository, DynamicConfigCache,
    DynamicConfigRepository, DynamicConfigService, FastRoleCache, GroupDirectory,
    RoleCacheService, RolePolicyWriter,
};
use rolegate_core::{AppError, AppResult, Clock, SystemClock};
use sqlx::PgPool;
use tracing::{info, warn};

use crate::{
    AwsIamRoleSource, InMemoryAuthorizationCache, InMemoryDynamicConfigCache, InMemoryRoleCache,
    InMemoryRoleSource, LoggingAccessRequestNotifier, PostgresAccessRequestRepository,
    PostgresDynamicConfigRepository, PostgresGroupDirectory, PostgresRoleCacheRepository, RedisAuthorizationCache, RedisDynamicConfigCache,
    RedisRoleCache, RoleSourceKind, RuntimeConfig, WebhookAccessRequestNotifier,
};

/// Port implementations selected from a [`RuntimeConfig`].
#[derive(Clone)]
pub struct RuntimeAdapters {
    /// Fast role tier.
    pub fast_roles: Arc<dyn FastRoleCache>,
    /// Durable role tier.
    pub durable_roles: Arc<dyn DurableRoleRepository>,
    /// Cloud role reads.
    pub cloud_roles: Arc<dyn CloudRoleSource>,
    /// Cloud policy writes.
    pub policy_writer: Arc<dyn RolePolicyWriter>,
    /// Durable dynamic configuration table.
    pub config_repository: Arc<dyn DynamicConfigRepository>,
    /// Fast copy of the dynamic configuration.
    pub config_cache: Arc<dyn DynamicConfigCache>,
    /// Eligible-roles cache.
    pub authorization_cache: Arc<dyn AuthorizationCache>,
    /// Access request table.
    pub access_requests: Arc<dyn AccessRequestRepository>,
    /// Group directory, shared through PostgreSQL.
    pub groups: Arc<dyn GroupDirectory>,
    /// Access request event sink.
    pub notifier: Arc<dyn AccessRequestNotifier>,
    /// Redis client when a fast tier is configured.
    pub redis_client: Option<redis::Client>,
}

impl RuntimeAdapters {
    /// Selects adapters for the configured backends.
    pub async fn connect(config: &RuntimeConfig, pool: PgPool) -> AppResult<Self> {
        let redis_client = config
            .redis_url
            .as_deref()
            .map(|redis_url| {
                redis::Client::open(redis_url)
                    .map_err(|error| AppError::Validation(format!("invalid REDIS_URL: {error}")))
            })
            .transpose()?;
        let prefix = config.redis_key_prefix.as_str();

        let (fast_roles, config_cache, authorization_cache): (
            Arc<dyn FastRoleCache>,
            Arc<dyn DynamicConfigCache>,
            Arc<dyn AuthorizationCache>,
        ) = match redis_client.clone() {
            Some(client) => {
                info!(cache_tier = "fast", backend = "redis", "fast tier configured");
                (
                    Arc::new(RedisRoleCache::new(client.clone(), prefix)),
                    Arc::new(RedisDynamicConfigCache::new(client.clone(), prefix)),
                    Arc::new(RedisAuthorizationCache::new(client, prefix)),
                )
            }
            None => {
                info!(cache_tier = "fast", backend = "memory", "fast tier configured");
                (
                    Arc::new(InMemoryRoleCache::new()),
                    Arc::new(InMemoryDynamicConfigCache::new()),
                    Arc::new(InMemoryAuthorizationCache::new()),
                )
            }
        };

        let (cloud_roles, policy_writer): (Arc<dyn CloudRoleSource>, Arc<dyn RolePolicyWriter>) =
            match config.role_source {
                RoleSourceKind::Aws => {
                    let source = Arc::new(
                        AwsIamRoleSource::from_env(config.assume_role_name.clone()).await,
                    );
                    (source.clone(), source)
                }
                RoleSourceKind::Memory => {
                    let source = Arc::new(InMemoryRoleSource::default());
                    (source.clone(), source)
                }
            };

        let notifier: Arc<dyn AccessRequestNotifier> = match config.notify_webhook_url.as_deref() {
            Some(endpoint) => Arc::new(WebhookAccessRequestNotifier::new(
                reqwest::Client::new(),
                endpoint,
                config.notify_max_attempts,
                config.notify_retry_backoff_ms,
            )),
            None => Arc::new(LoggingAccessRequestNotifier::new()),
        };

        Ok(Self {
            fast_roles,
            durable_roles: Arc::new(PostgresRoleCacheRepository::new(pool.clone())),
            cloud_roles,
            policy_writer,
            config_repository: Arc::new(PostgresDynamicConfigRepository::new(pool.clone())),
            config_cache,
            authorization_cache,
            access_requests: Arc::new(PostgresAccessRequestRepository::new(pool.clone())),
            groups: Arc::new(PostgresGroupDirectory::new(pool)),
            notifier,
            redis_client,
        })
    }
}

/// Application services wired over one set of adapters.
#[derive(Clone)]
pub struct RoleGateServices {
    /// Tiered role cache.
    pub role_cache: RoleCacheService,
    /// Dynamic configuration store.
    pub dynamic_config: DynamicConfigService,
    /// Authorization checks.
    pub authorization: AuthorizationService,
    /// Access request lifecycle.
    pub access_requests: AccessRequestService,
}

impl RoleGateServices {
    /// Builds the services and seeds the propagated configuration.
    ///
    /// The durable tier is read first; the fast tier is only a fallback when
    /// the durable read fails.
    pub async fn build(config: &RuntimeConfig, adapters: &RuntimeAdapters) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let settings = config.settings.clone();

        let role_cache = RoleCacheService::new(
            adapters.fast_roles.clone(),
            adapters.durable_roles.clone(),
            adapters.cloud_roles.clone(),
            clock.clone(),
            settings.clone(),
        );
        let dynamic_config = DynamicConfigService::new(
            adapters.config_repository.clone(),
            adapters.config_cache.clone(),
            clock.clone(),
        );
        if let Err(error) = dynamic_config.read().await {
            warn!(error = %error, "initial dynamic configuration read failed");
            dynamic_config.load_cached().await;
        }

        let authorization = AuthorizationService::new(
            Arc::new(config.authorization.clone()),
            dynamic_config.handle(),
            adapters.groups.clone(),
            adapters.authorization_cache.clone(),
            settings.clone(),
        );
        let access_requests = AccessRequestService::new(
            adapters.access_requests.clone(),
            adapters.groups.clone(),
            adapters.policy_writer.clone(),
            adapters.notifier.clone(),
            role_cache.clone(),
            authorization.clone(),
            clock,
            settings,
        );

        Self {
            role_cache,
            dynamic_config,
            authorization,
            access_requests,
        }
    }
}

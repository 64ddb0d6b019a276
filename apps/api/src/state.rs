use rolegate_application::{
    AccessRequestService, AuthorizationService, DynamicConfigService, RoleCacheService,
};
use rolegate_infrastructure::RoleGateServices;
use sqlx::PgPool;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub role_cache_service: RoleCacheService,
    pub dynamic_config_service: DynamicConfigService,
    pub authorization_service: AuthorizationService,
    pub access_request_service: AccessRequestService,
    pub postgres_pool: PgPool,
    pub redis_client: Option<redis::Client>,
}

impl AppState {
    pub fn new(
        services: RoleGateServices,
        postgres_pool: PgPool,
        redis_client: Option<redis::Client>,
    ) -> Self {
        Self {
            role_cache_service: services.role_cache,
            dynamic_config_service: services.dynamic_config,
            authorization_service: services.authorization,
            access_request_service: services.access_requests,
            postgres_pool,
            redis_client,
        }
    }
}

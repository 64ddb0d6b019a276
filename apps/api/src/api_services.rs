use rolegate_core::AppError;
use rolegate_infrastructure::{RoleGateServices, RuntimeAdapters};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::api_config::ApiConfig;
use crate::state::AppState;

pub async fn connect_and_migrate(database_url: &str) -> Result<PgPool, AppError> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))?;

    sqlx::migrate!("../../crates/infrastructure/migrations")
        .run(&pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to run migrations: {error}")))?;

    Ok(pool)
}

pub async fn build_app_state(config: &ApiConfig, pool: PgPool) -> Result<AppState, AppError> {
    let adapters = RuntimeAdapters::connect(&config.runtime, pool.clone()).await?;
    let services = RoleGateServices::build(&config.runtime, &adapters).await;

    Ok(AppState::new(services, pool, adapters.redis_client))
}

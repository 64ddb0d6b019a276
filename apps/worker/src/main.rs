//! rolegate maintenance worker runtime.

#![forbid(unsafe_code)]

use std::time::Duration;

use rolegate_application::run_periodic;
use rolegate_core::{AppError, AppResult};
use rolegate_infrastructure::{RoleGateServices, RuntimeAdapters, RuntimeConfig, parse_or};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
struct WorkerConfig {
    runtime: RuntimeConfig,
    purge_interval: Duration,
    expiry_interval: Duration,
    expiry_batch_size: usize,
    refresh_interval: Duration,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = WorkerConfig::from_lookup(|name| std::env::var(name).ok())?;
    let pool = connect_pool(config.runtime.database_url.as_str()).await?;
    let adapters = RuntimeAdapters::connect(&config.runtime, pool).await?;
    let services = RoleGateServices::build(&config.runtime, &adapters).await;

    info!(
        purge_interval_secs = config.purge_interval.as_secs(),
        expiry_interval_secs = config.expiry_interval.as_secs(),
        expiry_batch_size = config.expiry_batch_size,
        refresh_interval_secs = config.refresh_interval.as_secs(),
        accounts = config.runtime.account_ids.len(),
        "rolegate-worker started"
    );

    let shutdown = CancellationToken::new();
    let mut tasks = JoinSet::new();

    let dynamic_config = services.dynamic_config.clone();
    let poll_interval = config.runtime.settings.config_poll_interval;
    let poller_shutdown = shutdown.clone();
    tasks.spawn(async move {
        dynamic_config.run_poller(poll_interval, poller_shutdown).await;
    });

    let role_cache = services.role_cache.clone();
    tasks.spawn(run_periodic(
        "purge_expired_roles",
        config.purge_interval,
        shutdown.clone(),
        move || {
            let role_cache = role_cache.clone();
            async move {
                let purged = role_cache.purge_expired().await?;
                if purged > 0 {
                    info!(purged, cache_tier = "durable", "purged expired role rows");
                }
                Ok(())
            }
        },
    ));

    let access_requests = services.access_requests.clone();
    let batch_size = config.expiry_batch_size;
    tasks.spawn(run_periodic(
        "expire_access_requests",
        config.expiry_interval,
        shutdown.clone(),
        move || {
            let access_requests = access_requests.clone();
            async move {
                let expired = access_requests.expire_due_requests(batch_size).await?;
                if expired > 0 {
                    info!(expired, "expired approved access requests");
                }
                Ok(())
            }
        },
    ));

    if config.runtime.account_ids.is_empty() {
        info!("no ROLEGATE_ACCOUNT_IDS configured, account refresh disabled");
    } else {
        let role_cache = services.role_cache.clone();
        let account_ids = config.runtime.account_ids.clone();
        tasks.spawn(run_periodic(
            "refresh_accounts",
            config.refresh_interval,
            shutdown.clone(),
            move || {
                let role_cache = role_cache.clone();
                let account_ids = account_ids.clone();
                async move { refresh_accounts(&role_cache, &account_ids).await }
            },
        ));
    }

    wait_for_shutdown(shutdown).await;

    while let Some(joined) = tasks.join_next().await {
        if let Err(error) = joined {
            warn!(error = %error, "worker task ended abnormally");
        }
    }

    info!("rolegate-worker stopped");
    Ok(())
}

async fn refresh_accounts(
    role_cache: &rolegate_application::RoleCacheService,
    account_ids: &[String],
) -> AppResult<()> {
    let mut failed_accounts = 0_usize;
    for account_id in account_ids {
        match role_cache.refresh_account(account_id).await {
            Ok(summary) => info!(
                account_id = %account_id,
                refreshed = summary.refreshed,
                missing = summary.missing,
                failed = summary.failed,
                "account roles refreshed"
            ),
            Err(error) => {
                failed_accounts = failed_accounts.saturating_add(1);
                warn!(account_id = %account_id, error = %error, "account refresh failed");
            }
        }
    }

    if failed_accounts > 0 {
        return Err(AppError::Transient(format!(
            "{failed_accounts} of {} account refreshes failed",
            account_ids.len()
        )));
    }

    Ok(())
}

async fn wait_for_shutdown(shutdown: CancellationToken) {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(error = %error, "failed to listen for shutdown signal");
    }

    info!("shutdown requested");
    shutdown.cancel();
}

async fn connect_pool(database_url: &str) -> AppResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))
}

impl WorkerConfig {
    fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let purge_interval_secs: u64 = parse_or(&lookup, "WORKER_PURGE_INTERVAL_SECONDS", 3600)?;
        let expiry_interval_secs: u64 = parse_or(&lookup, "WORKER_EXPIRY_INTERVAL_SECONDS", 60)?;
        let expiry_batch_size: usize = parse_or(&lookup, "WORKER_EXPIRY_BATCH_SIZE", 100)?;
        let refresh_interval_secs: u64 =
            parse_or(&lookup, "WORKER_REFRESH_INTERVAL_SECONDS", 6 * 3600)?;

        for (name, value) in [
            ("WORKER_PURGE_INTERVAL_SECONDS", purge_interval_secs),
            ("WORKER_EXPIRY_INTERVAL_SECONDS", expiry_interval_secs),
            ("WORKER_REFRESH_INTERVAL_SECONDS", refresh_interval_secs),
        ] {
            if value == 0 {
                return Err(AppError::Validation(format!(
                    "{name} must be greater than zero"
                )));
            }
        }

        if expiry_batch_size == 0 {
            return Err(AppError::Validation(
                "WORKER_EXPIRY_BATCH_SIZE must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            runtime: RuntimeConfig::from_lookup(&lookup)?,
            purge_interval: Duration::from_secs(purge_interval_secs),
            expiry_interval: Duration::from_secs(expiry_interval_secs),
            expiry_batch_size,
            refresh_interval: Duration::from_secs(refresh_interval_secs),
        })
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rolegate_core::AppError;

    use super::WorkerConfig;

    fn lookup_from(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |name| {
            pairs
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value).to_owned())
        }
    }

    #[test]
    fn defaults_apply_when_worker_variables_are_unset() {
        let config = WorkerConfig::from_lookup(lookup_from(&[(
            "DATABASE_URL",
            "postgres://localhost/rolegate",
        )]));

        let Ok(config) = config else {
            panic!("defaults should load");
        };
        assert_eq!(config.purge_interval, Duration::from_secs(3600));
        assert_eq!(config.expiry_interval, Duration::from_secs(60));
        assert_eq!(config.expiry_batch_size, 100);
        assert!(config.runtime.account_ids.is_empty());
    }

    #[test]
    fn zero_interval_is_rejected() {
        let config = WorkerConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/rolegate"),
            ("WORKER_EXPIRY_INTERVAL_SECONDS", "0"),
        ]));

        assert!(matches!(config, Err(AppError::Validation(_))));
    }

    #[test]
    fn accounts_are_read_from_runtime_configuration() {
        let config = WorkerConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/rolegate"),
            ("ROLEGATE_ACCOUNT_IDS", "123456789012, 210987654321"),
            ("WORKER_REFRESH_INTERVAL_SECONDS", "900"),
        ]));

        let Ok(config) = config else {
            panic!("configuration should load");
        };
        assert_eq!(config.refresh_interval, Duration::from_secs(900));
        assert_eq!(
            config.runtime.account_ids,
            vec!["123456789012".to_owned(), "210987654321".to_owned()]
        );
    }
}

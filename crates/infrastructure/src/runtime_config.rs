//! Process configuration shared by the API and the worker.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use rolegate_application::{RoleGateSettings, StaticAuthorizationConfig};
use rolegate_core::{AppError, AppResult};
use rolegate_domain::Capability;

/// Where role data is read from and policy changes are written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleSourceKind {
    /// The IAM API through the default credential chain.
    Aws,
    /// An in-process store for local runs.
    Memory,
}

/// Adapter and tuning configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// PostgreSQL connection string.
    pub database_url: String,
    /// Redis connection string; in-memory fast tiers are used when absent.
    pub redis_url: Option<String>,
    /// Prefix of every Redis key written by this deployment.
    pub redis_key_prefix: String,
    /// Cloud role source.
    pub role_source: RoleSourceKind,
    /// Accounts warmed by the worker.
    pub account_ids: Vec<String>,
    /// Role assumed in each target account for IAM calls; the default
    /// credentials are used directly when absent.
    pub assume_role_name: Option<String>,
    /// Optional webhook receiving access request events.
    pub notify_webhook_url: Option<String>,
    /// Attempts per webhook notification.
    pub notify_max_attempts: u8,
    /// Linear backoff step between webhook attempts.
    pub notify_retry_backoff_ms: u64,
    /// Service tunables.
    pub settings: RoleGateSettings,
    /// Allow-lists fixed at process start.
    pub authorization: StaticAuthorizationConfig,
}

impl RuntimeConfig {
    /// Loads the configuration from process environment variables.
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads the configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| AppError::Validation("DATABASE_URL is required".to_owned()))?;

        let role_source = match lookup("ROLEGATE_ROLE_SOURCE")
            .unwrap_or_else(|| "aws".to_owned())
            .trim()
            .to_lowercase()
            .as_str()
        {
            "aws" => RoleSourceKind::Aws,
            "memory" => RoleSourceKind::Memory,
            other => {
                return Err(AppError::Validation(format!(
                    "ROLEGATE_ROLE_SOURCE must be either 'aws' or 'memory', got '{other}'"
                )));
            }
        };

        let defaults = RoleGateSettings::default();
        let retry_defaults = defaults.retry;
        let mut settings = RoleGateSettings {
            fast_tier_freshness_seconds: parse_or(
                &lookup,
                "ROLEGATE_FAST_TIER_FRESHNESS_SECONDS",
                defaults.fast_tier_freshness_seconds,
            )?,
            durable_tier_ttl_seconds: parse_or(
                &lookup,
                "ROLEGATE_DURABLE_TIER_TTL_SECONDS",
                defaults.durable_tier_ttl_seconds,
            )?,
            authorization_cache_ttl_seconds: parse_or(
                &lookup,
                "ROLEGATE_AUTHORIZATION_CACHE_TTL_SECONDS",
                defaults.authorization_cache_ttl_seconds,
            )?,
            config_poll_interval: Duration::from_secs(parse_or(
                &lookup,
                "ROLEGATE_CONFIG_POLL_INTERVAL_SECONDS",
                defaults.config_poll_interval.as_secs(),
            )?),
            reopen_window_seconds: parse_or(
                &lookup,
                "ROLEGATE_REOPEN_WINDOW_SECONDS",
                defaults.reopen_window_seconds,
            )?,
            template_tag_key: lookup("ROLEGATE_TEMPLATE_TAG_KEY")
                .filter(|value| !value.trim().is_empty())
                .unwrap_or(defaults.template_tag_key),
            retry: retry_defaults,
        };
        settings.retry.max_attempts = parse_or(
            &lookup,
            "ROLEGATE_RETRY_MAX_ATTEMPTS",
            retry_defaults.max_attempts,
        )?
        .max(1);
        settings.retry.call_timeout = Duration::from_millis(parse_or(
            &lookup,
            "ROLEGATE_CALL_TIMEOUT_MS",
            u64::try_from(retry_defaults.call_timeout.as_millis()).unwrap_or(u64::MAX),
        )?);

        if settings.config_poll_interval.is_zero() {
            return Err(AppError::Validation(
                "ROLEGATE_CONFIG_POLL_INTERVAL_SECONDS must be positive".to_owned(),
            ));
        }

        let capability_allow_lists = Capability::all()
            .iter()
            .map(|capability| {
                let name = format!("ROLEGATE_CAPABILITY_{}", capability.as_str().to_uppercase());
                (*capability, list(&lookup, name.as_str()))
            })
            .filter(|(_, members)| !members.is_empty())
            .collect::<HashMap<_, _>>();

        Ok(Self {
            database_url,
            redis_url: lookup("REDIS_URL").filter(|value| !value.trim().is_empty()),
            redis_key_prefix: lookup("ROLEGATE_REDIS_KEY_PREFIX")
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| "rolegate".to_owned()),
            role_source,
            account_ids: list(&lookup, "ROLEGATE_ACCOUNT_IDS"),
            assume_role_name: lookup("ROLEGATE_ASSUME_ROLE_NAME")
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty()),
            notify_webhook_url: lookup("ROLEGATE_NOTIFY_WEBHOOK_URL")
                .filter(|value| !value.trim().is_empty()),
            notify_max_attempts: parse_or(&lookup, "ROLEGATE_NOTIFY_MAX_ATTEMPTS", 3)?,
            notify_retry_backoff_ms: parse_or(&lookup, "ROLEGATE_NOTIFY_RETRY_BACKOFF_MS", 250)?,
            settings,
            authorization: StaticAuthorizationConfig {
                admins: list(&lookup, "ROLEGATE_ADMINS"),
                capability_allow_lists,
                self_approval_groups: list(&lookup, "ROLEGATE_SELF_APPROVAL_GROUPS"),
            },
        })
    }
}

/// Parses an optional variable, falling back to `default` when unset or blank.
pub fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> AppResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name).filter(|value| !value.trim().is_empty()) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map_err(|error| AppError::Validation(format!("invalid {name}: {error}"))),
        None => Ok(default),
    }
}

fn list<F>(lookup: &F, name: &str) -> Vec<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use rolegate_core::AppError;
    use rolegate_domain::Capability;

    use super::{RoleSourceKind, RuntimeConfig};

    fn load(pairs: &[(&str, &str)]) -> Result<RuntimeConfig, AppError> {
        let variables: HashMap<String, String> = pairs
            .iter()
            .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
            .collect();
        RuntimeConfig::from_lookup(|name| variables.get(name).cloned())
    }

    #[test]
    fn database_url_is_required() {
        assert!(matches!(load(&[]), Err(AppError::Validation(_))));
    }

    #[test]
    fn defaults_apply_when_variables_are_unset() {
        let Ok(config) = load(&[("DATABASE_URL", "postgres://localhost/rolegate")]) else {
            panic!("config should load");
        };

        assert_eq!(config.role_source, RoleSourceKind::Aws);
        assert_eq!(config.redis_url, None);
        assert_eq!(config.redis_key_prefix, "rolegate");
        assert_eq!(config.assume_role_name, None);
        assert_eq!(config.settings.fast_tier_freshness_seconds, 3600);
        assert_eq!(config.settings.durable_tier_ttl_seconds, 129_600);
        assert_eq!(config.settings.config_poll_interval, Duration::from_secs(60));
        assert!(config.authorization.admins.is_empty());
    }

    #[test]
    fn lists_and_capabilities_are_read_from_comma_separated_values() {
        let Ok(config) = load(&[
            ("DATABASE_URL", "postgres://localhost/rolegate"),
            ("ROLEGATE_ROLE_SOURCE", "memory"),
            ("ROLEGATE_ADMINS", "admins@example.com, ops@example.com,"),
            ("ROLEGATE_CAPABILITY_EDIT_CONFIG", "config-editors@example.com"),
            ("ROLEGATE_ACCOUNT_IDS", "123456789012,210987654321"),
            ("ROLEGATE_ASSUME_ROLE_NAME", " rolegate-reader "),
        ]) else {
            panic!("config should load");
        };

        assert_eq!(config.role_source, RoleSourceKind::Memory);
        assert_eq!(
            config.authorization.admins,
            vec!["admins@example.com".to_owned(), "ops@example.com".to_owned()]
        );
        assert_eq!(
            config.authorization.allow_list(Capability::EditConfig),
            ["config-editors@example.com".to_owned()]
        );
        assert!(config.authorization.allow_list(Capability::ModifyMembers).is_empty());
        assert_eq!(config.account_ids.len(), 2);
        assert_eq!(config.assume_role_name.as_deref(), Some("rolegate-reader"));
    }

    #[test]
    fn malformed_numbers_and_sources_are_rejected() {
        assert!(matches!(
            load(&[
                ("DATABASE_URL", "postgres://localhost/rolegate"),
                ("ROLEGATE_FAST_TIER_FRESHNESS_SECONDS", "soon"),
            ]),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            load(&[
                ("DATABASE_URL", "postgres://localhost/rolegate"),
                ("ROLEGATE_ROLE_SOURCE", "gcp"),
            ]),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            load(&[
                ("DATABASE_URL", "postgres://localhost/rolegate"),
                ("ROLEGATE_CONFIG_POLL_INTERVAL_SECONDS", "0"),
            ]),
            Err(AppError::Validation(_))
        ));
    }
}

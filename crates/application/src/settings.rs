use std::collections::HashMap;
use std::time::Duration;

use rolegate_domain::{Capability, REOPEN_WINDOW_SECONDS};

/// Bounded retry behaviour for calls to external dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first call.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Upper bound for the doubling backoff.
    pub max_backoff: Duration,
    /// Timeout applied to every single attempt.
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(2),
            call_timeout: Duration::from_secs(10),
        }
    }
}

/// Tunables shared by the application services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleGateSettings {
    /// How long a fast-tier role entry stays servable after it was written.
    pub fast_tier_freshness_seconds: u32,
    /// Durable-tier role ttl measured from the last successful cloud fetch.
    pub durable_tier_ttl_seconds: u32,
    /// Expiry of per-user eligible-role cache entries.
    pub authorization_cache_ttl_seconds: u32,
    /// Interval of the dynamic configuration poller.
    pub config_poll_interval: Duration,
    /// Window during which rejected or cancelled requests may be reopened.
    pub reopen_window_seconds: i64,
    /// Role tag whose value names the template a role was generated from.
    pub template_tag_key: String,
    /// Retry behaviour for cloud calls.
    pub retry: RetryPolicy,
}

impl Default for RoleGateSettings {
    fn default() -> Self {
        Self {
            fast_tier_freshness_seconds: 60 * 60,
            durable_tier_ttl_seconds: 36 * 60 * 60,
            authorization_cache_ttl_seconds: 5 * 60,
            config_poll_interval: Duration::from_secs(60),
            reopen_window_seconds: REOPEN_WINDOW_SECONDS,
            template_tag_key: "rolegate:template".to_owned(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Authorization lists fixed at process start.
///
/// Dynamic configuration augments these lists and never replaces them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticAuthorizationConfig {
    /// Users or groups holding every capability.
    pub admins: Vec<String>,
    /// Per-capability allow-lists.
    pub capability_allow_lists: HashMap<Capability, Vec<String>>,
    /// Groups whose members auto-approve their own requests.
    pub self_approval_groups: Vec<String>,
}

impl StaticAuthorizationConfig {
    /// Returns the static allow-list for one capability.
    #[must_use]
    pub fn allow_list(&self, capability: Capability) -> &[String] {
        self.capability_allow_lists
            .get(&capability)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

use std::sync::Arc;

use rolegate_core::{AppResult, Clock};
use rolegate_domain::{RoleDocument, RoleKey};
use tracing::{debug, info, warn};

use crate::role_cache_ports::{
    CloudRoleSource, DurableRoleRecord, DurableRoleRepository, FastRoleCache, RoleLookup,
};
use crate::{RoleGateSettings, call_with_retry};

mod account;
mod tiers;

pub use account::AccountRefreshSummary;

/// Tiered read-through/write-through role cache.
///
/// Lookups consult the fast tier, then the durable tier, then the cloud
/// provider. Concurrent refreshes of one key are not coordinated: a refresh
/// is a deterministic function of cloud state, so the last writer wins at
/// both tiers.
#[derive(Clone)]
pub struct RoleCacheService {
    fast_tier: Arc<dyn FastRoleCache>,
    durable_tier: Arc<dyn DurableRoleRepository>,
    cloud: Arc<dyn CloudRoleSource>,
    clock: Arc<dyn Clock>,
    settings: RoleGateSettings,
}

impl RoleCacheService {
    /// Creates a role cache from its three tiers.
    #[must_use]
    pub fn new(
        fast_tier: Arc<dyn FastRoleCache>,
        durable_tier: Arc<dyn DurableRoleRepository>,
        cloud: Arc<dyn CloudRoleSource>,
        clock: Arc<dyn Clock>,
        settings: RoleGateSettings,
    ) -> Self {
        Self {
            fast_tier,
            durable_tier,
            cloud,
            clock,
            settings,
        }
    }

    /// Returns a role, refreshing tiers on miss, staleness or `force_refresh`.
    pub async fn fetch_role(&self, key: &RoleKey, force_refresh: bool) -> AppResult<RoleLookup> {
        if !force_refresh {
            if let Some(role) = self.read_fast_tier(key).await {
                debug!(
                    arn = %key.arn(),
                    account_id = %key.account_id(),
                    cache_tier = "fast",
                    "role cache hit"
                );
                return Ok(RoleLookup::Found(role));
            }

            if let Some(role) = self.read_durable_tier(key).await? {
                debug!(
                    arn = %key.arn(),
                    account_id = %key.account_id(),
                    cache_tier = "durable",
                    "role cache hit"
                );
                self.write_fast_tier(key, &role).await;
                return Ok(RoleLookup::Found(role));
            }
        }

        self.refresh_from_cloud(key).await
    }

    async fn refresh_from_cloud(&self, key: &RoleKey) -> AppResult<RoleLookup> {
        let fetched = call_with_retry(&self.settings.retry, "iam fetch_role", || {
            self.cloud.fetch_role(key)
        })
        .await?;

        let Some(role) = fetched else {
            info!(
                arn = %key.arn(),
                account_id = %key.account_id(),
                "role does not exist in cloud provider"
            );
            return Ok(RoleLookup::Missing);
        };

        if let Err(error) = role.ensure_describes(key) {
            warn!(
                arn = %key.arn(),
                account_id = %key.account_id(),
                returned_arn = %role.arn,
                "cloud provider returned a different role; not caching"
            );
            return Err(error);
        }

        let role = self.finalize_cloud_document(role);
        let record = DurableRoleRecord {
            arn: key.arn().to_owned(),
            account_id: key.account_id().to_owned(),
            policy: role.to_policy_json()?,
            templated: role.templated.clone(),
            ttl: role
                .fetched_at
                .saturating_add(i64::from(self.settings.durable_tier_ttl_seconds)),
        };

        self.durable_tier.save_role(record).await?;
        self.write_fast_tier(key, &role).await;
        debug!(
            arn = %key.arn(),
            account_id = %key.account_id(),
            cache_tier = "cloud",
            "role refreshed"
        );

        Ok(RoleLookup::Found(role))
    }

    fn finalize_cloud_document(&self, mut role: RoleDocument) -> RoleDocument {
        role.fetched_at = self.clock.epoch_seconds();
        role.templated = role.tags.get(self.settings.template_tag_key.as_str()).cloned();
        role.canonicalized()
    }

    /// Deletes durable role rows past their ttl.
    pub async fn purge_expired(&self) -> AppResult<u64> {
        let removed = self
            .durable_tier
            .delete_expired(self.clock.epoch_seconds())
            .await?;

        if removed > 0 {
            info!(removed = removed, "purged expired durable role entries");
        }

        Ok(removed)
    }

    fn now(&self) -> i64 {
        self.clock.epoch_seconds()
    }
}

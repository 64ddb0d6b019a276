use tracing::warn;

use crate::role_cache_ports::FastTierRole;

use super::*;

impl RoleCacheService {
    /// Returns the fast-tier role when present and inside the freshness horizon.
    pub(super) async fn read_fast_tier(&self, key: &RoleKey) -> Option<RoleDocument> {
        match self.fast_tier.get_role(key).await {
            Ok(Some(entry)) if self.is_fresh(&entry) => Some(entry.role),
            Ok(_) => None,
            Err(error) => {
                warn!(
                    arn = %key.arn(),
                    error = %error,
                    cache_tier = "fast",
                    "failed to read role cache entry"
                );
                None
            }
        }
    }

    /// Returns the durable-tier role unless it is absent or past its ttl.
    ///
    /// Durable-tier failures are surfaced to the caller.
    pub(super) async fn read_durable_tier(&self, key: &RoleKey) -> AppResult<Option<RoleDocument>> {
        let Some(record) = self.durable_tier.find_role(key).await? else {
            return Ok(None);
        };

        if record.ttl <= self.now() {
            return Ok(None);
        }

        RoleDocument::from_policy_json(record.policy.as_str()).map(Some)
    }

    pub(super) async fn write_fast_tier(&self, key: &RoleKey, role: &RoleDocument) {
        let entry = FastTierRole {
            role: role.clone(),
            cached_at: self.now(),
        };

        if let Err(error) = self
            .fast_tier
            .put_role(key, entry, self.settings.fast_tier_freshness_seconds)
            .await
        {
            warn!(
                arn = %key.arn(),
                error = %error,
                cache_tier = "fast",
                "failed to write role cache entry"
            );
        }
    }

    fn is_fresh(&self, entry: &FastTierRole) -> bool {
        self.now().saturating_sub(entry.cached_at)
            < i64::from(self.settings.fast_tier_freshness_seconds)
    }
}

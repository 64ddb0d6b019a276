use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rolegate_application::AuthorizationCache;
use rolegate_core::AppResult;
use rolegate_domain::RoleMapping;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct EligibleRolesEntry {
    roles: Vec<RoleMapping>,
    expires_at: Instant,
}

/// In-memory eligible-roles cache with per-entry expiry.
#[derive(Default)]
pub struct InMemoryAuthorizationCache {
    entries: RwLock<HashMap<(String, bool), EligibleRolesEntry>>,
}

impl InMemoryAuthorizationCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuthorizationCache for InMemoryAuthorizationCache {
    async fn get_eligible_roles(
        &self,
        user: &str,
        console_only: bool,
    ) -> AppResult<Option<Vec<RoleMapping>>> {
        let key = (user.to_lowercase(), console_only);
        {
            let entries = self.entries.read().await;
            match entries.get(&key) {
                Some(entry) if entry.expires_at > Instant::now() => {
                    return Ok(Some(entry.roles.clone()));
                }
                Some(_) => {}
                None => return Ok(None),
            }
        }

        self.entries.write().await.remove(&key);
        Ok(None)
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

        self.entries.write().await.insert(
            (user.to_lowercase(), console_only),
            EligibleRolesEntry {
                roles: roles.to_vec(),
                expires_at: Instant::now() + Duration::from_secs(u64::from(ttl_seconds)),
            },
        );
        Ok(())
    }

    async fn invalidate_user(&self, user: &str) -> AppResult<()> {
        let user = user.to_lowercase();
        self.entries
            .write()
            .await
            .retain(|(cached_user, _), _| *cached_user != user);
        Ok(())
    }
}

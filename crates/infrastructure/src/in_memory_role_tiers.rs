use std::collections::HashMap;

use async_trait::async_trait;
use rolegate_application::{DurableRoleRecord, DurableRoleRepository, FastRoleCache, FastTierRole};
use rolegate_core::AppResult;
use rolegate_domain::RoleKey;
use tokio::sync::RwLock;

/// In-memory fast role tier for local runs and tests.
#[derive(Default)]
pub struct InMemoryRoleCache {
    entries: RwLock<HashMap<RoleKey, FastTierRole>>,
}

impl InMemoryRoleCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FastRoleCache for InMemoryRoleCache {
    async fn get_role(&self, key: &RoleKey) -> AppResult<Option<FastTierRole>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put_role(
        &self,
        key: &RoleKey,
        entry: FastTierRole,
        _freshness_seconds: u32,
    ) -> AppResult<()> {
        self.entries.write().await.insert(key.clone(), entry);
        Ok(())
    }
}

/// In-memory durable role tier for local runs and tests.
#[derive(Default)]
pub struct InMemoryDurableRoleRepository {
    rows: RwLock<HashMap<(String, String), DurableRoleRecord>>,
}

impl InMemoryDurableRoleRepository {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DurableRoleRepository for InMemoryDurableRoleRepository {
    async fn find_role(&self, key: &RoleKey) -> AppResult<Option<DurableRoleRecord>> {
        Ok(self
            .rows
            .read()
            .await
            .get(&(key.arn().to_owned(), key.account_id().to_owned()))
            .cloned())
    }

    async fn save_role(&self, record: DurableRoleRecord) -> AppResult<()> {
        self.rows
            .write()
            .await
            .insert((record.arn.clone(), record.account_id.clone()), record);
        Ok(())
    }

    async fn delete_expired(&self, now: i64) -> AppResult<u64> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|_, record| record.ttl > now);
        Ok(u64::try_from(before.saturating_sub(rows.len())).unwrap_or(u64::MAX))
    }
}
